//! Configuration and constants
//!
//! - [`defaults`] - Default values and thresholds
//! - [`paths`] - Host paths and profile file names

pub mod defaults;
pub mod paths;
