//! Build profile staging
//!
//! Copies the base archiso profile into the work directory, checks the files
//! the image builder cannot do without, and rewrites the identity keys of
//! `profiledef.sh`.

use std::path::Path;

use crate::config::paths::{CRITICAL_PROFILE_FILES, PROFILEDEF_FILE, PROFILE_PACMAN_CONF};
use crate::error::{FilesystemError, PipelineError};
use crate::infra::filesystem;
use crate::infra::pacman::Pacman;

/// Package providing the image builder
pub const BUILDER_PACKAGE: &str = "archiso";

/// Identity values written into `profiledef.sh`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileIdentity {
    /// `iso_name`
    pub name: String,
    /// `iso_label`
    pub label: String,
    /// `iso_publisher`
    pub publisher: String,
    /// `iso_application`
    pub application: String,
}

/// Make sure the image builder package is installed, installing it if not
///
/// Returns `true` when an install was performed.
pub fn ensure_builder_installed(pacman: &Pacman<'_>) -> Result<bool, PipelineError> {
    if pacman.is_installed(BUILDER_PACKAGE) {
        tracing::debug!("{} is installed", BUILDER_PACKAGE);
        return Ok(false);
    }

    tracing::warn!("Installing {}...", BUILDER_PACKAGE);
    pacman
        .install(BUILDER_PACKAGE)
        .map_err(|e| PipelineError::Tooling(e.to_string()))?;
    Ok(true)
}

/// Copy the base profile to `profile_dir` and check its critical files
///
/// Any previous content of `profile_dir` is removed first.
pub fn stage_profile(source: &Path, profile_dir: &Path) -> Result<(), PipelineError> {
    if !source.is_dir() {
        return Err(PipelineError::MissingBaseProfile {
            path: source.to_path_buf(),
        });
    }

    filesystem::remove_dir_all(profile_dir)?;
    filesystem::copy_tree(source, profile_dir)?;
    verify_critical_files(profile_dir)
}

/// Fail on the first critical profile file that is missing
pub fn verify_critical_files(profile_dir: &Path) -> Result<(), PipelineError> {
    for name in CRITICAL_PROFILE_FILES {
        if !profile_dir.join(name).exists() {
            return Err(PipelineError::MissingCriticalProfileFile {
                name: (*name).to_string(),
            });
        }
    }
    Ok(())
}

/// Replace the staged `pacman.conf` with the host's
pub fn adopt_host_pacman_conf(host_conf: &Path, profile_dir: &Path) -> Result<(), FilesystemError> {
    let target = profile_dir.join(PROFILE_PACMAN_CONF);
    filesystem::copy_file(host_conf, &target)?;
    filesystem::set_mode(&target, filesystem::CONFIG_MODE)
}

/// Rewrite the identity keys of the staged `profiledef.sh`
pub fn rewrite_profiledef(profile_dir: &Path, identity: &ProfileIdentity) -> Result<(), PipelineError> {
    let path = profile_dir.join(PROFILEDEF_FILE);
    if !path.is_file() {
        return Err(PipelineError::MissingCriticalProfileFile {
            name: PROFILEDEF_FILE.to_string(),
        });
    }

    let original = filesystem::read_file(&path)?;
    filesystem::write_script(&path, &rewrite_profiledef_content(&original, identity))?;

    let written = path.metadata().map(|m| m.len()).unwrap_or(0);
    if written == 0 {
        return Err(FilesystemError::WriteFile {
            path,
            error: "file is empty after write".to_string(),
        }
        .into());
    }
    Ok(())
}

/// Rewrite the identity keys in `profiledef.sh` content
///
/// Only lines assigning `iso_name`, `iso_label`, `iso_publisher`,
/// `iso_application` or `pacman_conf` change; everything else, including
/// line endings, is preserved.
pub fn rewrite_profiledef_content(content: &str, identity: &ProfileIdentity) -> String {
    let replacements = [
        ("iso_name", identity.name.as_str()),
        ("iso_label", identity.label.as_str()),
        ("iso_publisher", identity.publisher.as_str()),
        ("iso_application", identity.application.as_str()),
        ("pacman_conf", PROFILE_PACMAN_CONF),
    ];

    content
        .split_inclusive('\n')
        .map(|line| {
            let trimmed = line.trim_start();
            replacements
                .iter()
                .find(|(key, _)| {
                    trimmed
                        .strip_prefix(key)
                        .is_some_and(|rest| rest.starts_with('='))
                })
                .map_or_else(
                    || line.to_string(),
                    |(key, value)| format!("{key}={}\n", double_quote(value)),
                )
        })
        .collect()
}

/// Quote a value for a double-quoted shell assignment
fn double_quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\' | '$' | '`') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}
