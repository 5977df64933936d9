//! Core business logic module
//!
//! This module contains the image build engine and its collaborators.
//! Process and filesystem primitives live in [`crate::infra`].
//!
//! # Submodules
//!
//! - [`classify`] - Package classification against the sync repositories
//! - [`manifest`] - Package list (packages.x86_64) generation
//! - [`local_repo`] - Local repository for non-repository packages
//! - [`profile`] - Base profile staging and profiledef.sh rewriting
//! - [`scripts`] - Generated live-system and installer scripts
//! - [`customize`] - Live root filesystem customization
//! - [`progress`] - Progress milestones and output line classification
//! - [`driver`] - Image builder execution
//! - [`verify`] - Artifact verification and checksums
//! - [`pipeline`] - Build orchestration
//! - [`flash`] - Writing images to removable media
//! - [`devices`] - Removable block device discovery
//! - [`users`] - Host account discovery
//! - [`build_config`] - Per-attempt build configuration
//! - [`global_config`] - Configuration file handling
//! - [`events`] - Log and progress events
//! - [`report`] - Build results and warnings
//! - [`doctor`] - Host prerequisite checks
//! - [`clean`] - Work and output directory removal

pub mod build_config;
pub mod classify;
pub mod clean;
pub mod customize;
pub mod devices;
pub mod doctor;
pub mod driver;
pub mod events;
pub mod flash;
pub mod global_config;
pub mod local_repo;
pub mod manifest;
pub mod pipeline;
pub mod profile;
pub mod progress;
pub mod report;
pub mod scripts;
pub mod users;
pub mod verify;
