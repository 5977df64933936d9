//! isoforge - Build a bootable, installable Arch Linux image from the running system
//!
//! The installed package set, a live user account and selected host
//! configuration are captured into an archiso profile, the image builder is
//! driven to completion and the resulting ISO is validated. The image can then
//! be written to removable media.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`cli`] - Command-line interface parsing and output formatting
//! - [`core`] - Build pipeline and its stages
//! - [`infra`] - Infrastructure layer (filesystem, processes, pacman)
//! - [`config`] - Configuration and constants
//! - [`error`] - Error types and handling

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod infra;
