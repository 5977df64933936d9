//! Clean logic
//!
//! Removes the work and output directories left behind by earlier builds.
//! Builds wipe both on start, so this only reclaims disk space.

use std::path::{Path, PathBuf};

use crate::core::build_config::BuildConfig;
use crate::error::FilesystemError;
use crate::infra::filesystem;

/// Result of clean operation
#[derive(Debug, Default)]
pub struct CleanResult {
    /// Directories that were removed
    pub removed: Vec<PathBuf>,
    /// Directories that didn't exist (skipped)
    pub skipped: Vec<PathBuf>,
}

/// Remove the work and output directories of `config`
pub fn clean_build_dirs(config: &BuildConfig) -> Result<CleanResult, FilesystemError> {
    clean_dirs(&[config.work_dir.as_path(), config.output_dir.as_path()])
}

/// Remove each directory in `dirs` if it exists
pub fn clean_dirs(dirs: &[&Path]) -> Result<CleanResult, FilesystemError> {
    let mut result = CleanResult::default();

    for dir in dirs {
        if dir.exists() {
            filesystem::remove_dir_all(dir)?;
            tracing::info!("Removed {}", dir.display());
            result.removed.push(dir.to_path_buf());
        } else {
            result.skipped.push(dir.to_path_buf());
        }
    }

    Ok(result)
}

/// Check whether any of the build directories of `config` exist
pub fn has_build_artifacts(config: &BuildConfig) -> bool {
    config.work_dir.exists() || config.output_dir.exists()
}
