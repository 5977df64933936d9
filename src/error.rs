//! Error types for isoforge
//!
//! Domain-specific error types using thiserror.

use std::path::PathBuf;
use thiserror::Error;

/// Filesystem errors
#[derive(Error, Debug)]
pub enum FilesystemError {
    /// Failed to create directory
    #[error("Failed to create directory '{path}': {error}")]
    CreateDir { path: PathBuf, error: String },

    /// Failed to remove directory
    #[error("Failed to remove directory '{path}': {error}")]
    RemoveDir { path: PathBuf, error: String },

    /// Failed to remove file
    #[error("Failed to remove file '{path}': {error}")]
    RemoveFile { path: PathBuf, error: String },

    /// Failed to write file
    #[error("Failed to write file '{path}': {error}")]
    WriteFile { path: PathBuf, error: String },

    /// Failed to read file
    #[error("Failed to read file '{path}': {error}")]
    ReadFile { path: PathBuf, error: String },

    /// Failed to copy a file or tree
    #[error("Failed to copy '{from}' to '{to}': {error}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        error: String,
    },

    /// Failed to change permissions
    #[error("Failed to set permissions on '{path}': {error}")]
    Permissions { path: PathBuf, error: String },
}

/// External command errors
#[derive(Error, Debug)]
pub enum CommandError {
    /// Command could not be started
    #[error("Failed to run '{program}': {error}")]
    Spawn { program: String, error: String },

    /// Command ran but exited unsuccessfully
    ///
    /// Both streams are kept: pacman and repo-add print their diagnostics on
    /// stdout.
    #[error("'{program}' exited with code {code:?}: {}", failure_output(stdout, stderr))]
    Failed {
        program: String,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
}

fn failure_output(stdout: &str, stderr: &str) -> String {
    [stdout, stderr]
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file '{path}': {error}")]
    Read { path: PathBuf, error: String },

    /// Failed to parse config file
    #[error("Failed to parse config file '{path}': {error}")]
    Parse { path: PathBuf, error: String },

    /// A value is present but unusable
    #[error("Invalid configuration value for '{key}': {message}")]
    Invalid { key: String, message: String },
}

/// Terminal failure reasons of a build attempt
///
/// Every variant aborts the remaining pipeline. Warnings that do not abort
/// (small package list, small payload) live in
/// [`crate::core::report::BuildWarning`].
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Base profile directory or its package list is missing
    #[error("Base profile not found: {path} does not exist")]
    MissingBaseProfile { path: PathBuf },

    /// A file the image builder needs is missing from the staged profile
    #[error("Critical profile file missing: {name}")]
    MissingCriticalProfileFile { name: String },

    /// The written package list lost a required package
    #[error("Package list missing critical packages: {}", packages.join(", "))]
    RequiredPackageMissingAfterBuild { packages: Vec<String> },

    /// The image builder exited non-zero and produced nothing
    #[error("Build process failed with exit code {code:?}")]
    SubprocessFailed { code: Option<i32> },

    /// The image builder exited cleanly but no image was produced
    #[error("ISO file not found in output directory '{output_dir}'")]
    ArtifactMissing { output_dir: PathBuf },

    /// Image is too small and no squashfs payload was found
    #[error(
        "ISO verification failed - image is only {size} bytes and no squashfs payload was found{}",
        if fatal_signals.is_empty() { String::new() } else { format!(" ({} error lines in build output)", fatal_signals.len()) }
    )]
    PayloadMissing {
        size: u64,
        fatal_signals: Vec<String>,
    },

    /// The image builder package could not be installed
    #[error("Image builder tooling unavailable: {0}")]
    Tooling(String),

    /// Filesystem error
    #[error(transparent)]
    Filesystem(#[from] FilesystemError),

    /// External command error
    #[error(transparent)]
    Command(#[from] CommandError),
}

/// Media write errors
#[derive(Error, Debug)]
pub enum WriteError {
    /// Not running with root privileges
    #[error("Must run as root (use sudo) to write to a device")]
    NotRoot,

    /// Target device does not exist
    #[error("Device {path} does not exist")]
    DeviceNotFound { path: PathBuf },

    /// Image does not exist
    #[error("Image {path} does not exist")]
    ImageNotFound { path: PathBuf },

    /// dd exited unsuccessfully
    #[error("Write process failed with exit code {code:?}")]
    Failed { code: Option<i32> },

    /// Write was interrupted by the operator
    #[error("Write stopped by operator")]
    Cancelled,

    /// External command error
    #[error(transparent)]
    Command(#[from] CommandError),
}
