//! Platform-specific directory management
//!
//! Provides the configuration directory and the default work and output
//! directories. Follows the XDG Base Directory Specification.
//!
//! Environment variables can override default directories:
//! - `ISOFORGE_CONFIG_DIR` - Override config directory
//! - `ISOFORGE_WORK_DIR` - Override default work directory
//! - `ISOFORGE_OUTPUT_DIR` - Override default output directory

use std::env;
use std::path::PathBuf;

/// Environment variable names for directory overrides
pub const ENV_CONFIG_DIR: &str = "ISOFORGE_CONFIG_DIR";
pub const ENV_WORK_DIR: &str = "ISOFORGE_WORK_DIR";
pub const ENV_OUTPUT_DIR: &str = "ISOFORGE_OUTPUT_DIR";

/// Application name used in directory paths
const APP_NAME: &str = "isoforge";

/// Default work directory name under the home directory
const WORK_SUBDIR: &str = "archiso_work";

/// Default output directory name under the home directory
const OUTPUT_SUBDIR: &str = "iso_output";

/// Directory provider for isoforge
#[derive(Debug, Clone)]
pub struct ForgeDirs {
    config_dir: PathBuf,
    work_dir: PathBuf,
    output_dir: PathBuf,
}

impl ForgeDirs {
    /// Create a new `ForgeDirs` instance
    ///
    /// Checks environment variables first, then falls back to platform defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config_dir: env_or(ENV_CONFIG_DIR, Self::platform_config_dir),
            work_dir: env_or(ENV_WORK_DIR, || home().join(WORK_SUBDIR)),
            output_dir: env_or(ENV_OUTPUT_DIR, || home().join(OUTPUT_SUBDIR)),
        }
    }

    /// Get the config directory path
    ///
    /// - Linux: `$XDG_CONFIG_HOME/isoforge` or `~/.config/isoforge`
    #[must_use]
    pub fn config_dir(&self) -> PathBuf {
        self.config_dir.clone()
    }

    /// Get the config file path (`config.toml` in the config directory)
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    /// Default work directory (`~/archiso_work`)
    #[must_use]
    pub fn default_work_dir(&self) -> PathBuf {
        self.work_dir.clone()
    }

    /// Default output directory (`~/iso_output`)
    #[must_use]
    pub fn default_output_dir(&self) -> PathBuf {
        self.output_dir.clone()
    }

    fn platform_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|p| p.join(APP_NAME))
            .unwrap_or_else(|| home().join(".config").join(APP_NAME))
    }
}

impl Default for ForgeDirs {
    fn default() -> Self {
        Self::new()
    }
}

fn env_or(var: &str, fallback: impl FnOnce() -> PathBuf) -> PathBuf {
    match env::var(var) {
        Ok(path) if !path.is_empty() => PathBuf::from(path),
        _ => fallback(),
    }
}

fn home() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirs_new_creates_instance() {
        let dirs = ForgeDirs::new();
        assert!(!dirs.config_dir().as_os_str().is_empty());
        assert!(!dirs.default_work_dir().as_os_str().is_empty());
        assert!(!dirs.default_output_dir().as_os_str().is_empty());
    }

    #[test]
    fn test_config_path_is_under_config_dir() {
        let dirs = ForgeDirs::new();
        assert!(dirs.config_path().starts_with(dirs.config_dir()));
        assert!(dirs.config_path().ends_with("config.toml"));
    }
}
