//! Global configuration management
//!
//! Reads settings from `config.toml` in the config directory. The file is
//! loaded once at start-up, overlaid with command-line flags, and passed by
//! reference into the pipeline. It is never written back.

use crate::config::{defaults, paths};
use crate::error::ConfigError;
use crate::infra::dirs::ForgeDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Global configuration for isoforge
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForgeConfig {
    /// Directory settings
    #[serde(default)]
    pub paths: PathsConfig,

    /// Image identity
    #[serde(default)]
    pub image: ImageConfig,

    /// Package selection
    #[serde(default)]
    pub packages: PackagesConfig,

    /// Live user account
    #[serde(default)]
    pub user: UserSection,

    /// Directory exclusions
    #[serde(default)]
    pub filesystem: FilesystemConfig,

    /// External image builder
    #[serde(default)]
    pub builder: BuilderConfig,
}

/// Directory settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathsConfig {
    /// Work directory (wiped on every build)
    pub work_dir: Option<PathBuf>,

    /// Output directory (wiped on every build)
    pub output_dir: Option<PathBuf>,

    /// Base profile to copy
    pub profile_source: Option<PathBuf>,

    /// pacman package cache
    pub package_cache: Option<PathBuf>,
}

/// Image identity
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImageConfig {
    /// Image name prefix
    pub name: Option<String>,

    /// Volume label
    pub label: Option<String>,

    /// Publisher string
    pub publisher: Option<String>,

    /// Application string
    pub application: Option<String>,

    /// Hostname of the live system
    pub hostname: Option<String>,
}

/// Package selection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackagesConfig {
    /// Packages never to install
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Include custom repositories and AUR packages
    pub include_custom_repos: Option<bool>,

    /// Packages added so the live session reaches a graphical login
    pub session_packages: Option<Vec<String>>,

    /// Package lists shorter than this trigger a warning
    pub min_count: Option<usize>,
}

/// Live user account
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserSection {
    /// Account name
    pub username: Option<String>,

    /// Account password
    pub password: Option<String>,

    /// Root password
    pub root_password: Option<String>,

    /// Host account whose home seeds the live user's home
    pub copy_from: Option<String>,

    /// Log the live user in automatically
    pub autologin: Option<bool>,
}

/// Directory exclusions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilesystemConfig {
    /// Directory patterns excluded from the image
    pub exclude_dirs: Option<Vec<String>>,
}

/// External image builder
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuilderConfig {
    /// Builder command
    pub command: Option<String>,
}

impl ForgeConfig {
    /// Load configuration from the config directory
    ///
    /// A missing file yields the defaults; an unparsable one is an error.
    pub fn load(dirs: &ForgeDirs) -> Result<Self, ConfigError> {
        Self::load_from_path(&dirs.config_path())
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(name) = &self.user.username {
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
                return Err(ConfigError::Invalid {
                    key: "user.username".to_string(),
                    message: format!("'{name}' is not a valid account name"),
                });
            }
        }
        if let Some(name) = &self.image.name {
            if name.is_empty() || name.contains('/') {
                return Err(ConfigError::Invalid {
                    key: "image.name".to_string(),
                    message: format!("'{name}' cannot be used as a file name prefix"),
                });
            }
        }
        Ok(())
    }

    /// Effective work directory
    #[must_use]
    pub fn work_dir(&self, dirs: &ForgeDirs) -> PathBuf {
        self.paths
            .work_dir
            .clone()
            .unwrap_or_else(|| dirs.default_work_dir())
    }

    /// Effective output directory
    #[must_use]
    pub fn output_dir(&self, dirs: &ForgeDirs) -> PathBuf {
        self.paths
            .output_dir
            .clone()
            .unwrap_or_else(|| dirs.default_output_dir())
    }

    /// Effective base profile directory
    #[must_use]
    pub fn profile_source(&self) -> PathBuf {
        self.paths
            .profile_source
            .clone()
            .unwrap_or_else(|| PathBuf::from(paths::RELENG_PROFILE))
    }

    /// Effective package cache directory
    #[must_use]
    pub fn package_cache(&self) -> PathBuf {
        self.paths
            .package_cache
            .clone()
            .unwrap_or_else(|| PathBuf::from(paths::PACMAN_CACHE))
    }

    /// Effective image name prefix
    #[must_use]
    pub fn image_name(&self) -> &str {
        self.image
            .name
            .as_deref()
            .unwrap_or(defaults::DEFAULT_IMAGE_NAME)
    }

    /// Effective volume label (`ARCH_CUSTOM_<YYYYMM>` unless configured)
    #[must_use]
    pub fn image_label(&self) -> String {
        self.image.label.clone().unwrap_or_else(|| {
            format!(
                "{}{}",
                defaults::DEFAULT_LABEL_PREFIX,
                chrono::Local::now().format("%Y%m")
            )
        })
    }

    /// Effective publisher
    #[must_use]
    pub fn publisher(&self) -> &str {
        self.image
            .publisher
            .as_deref()
            .unwrap_or(defaults::DEFAULT_PUBLISHER)
    }

    /// Effective application name
    #[must_use]
    pub fn application(&self) -> &str {
        self.image
            .application
            .as_deref()
            .unwrap_or(defaults::DEFAULT_APPLICATION)
    }

    /// Effective live hostname
    #[must_use]
    pub fn hostname(&self) -> &str {
        self.image
            .hostname
            .as_deref()
            .unwrap_or(defaults::DEFAULT_LIVE_HOSTNAME)
    }

    /// Whether custom repositories and AUR packages are included
    #[must_use]
    pub fn include_custom_repos(&self) -> bool {
        self.packages.include_custom_repos.unwrap_or(true)
    }

    /// Effective live-session package set
    #[must_use]
    pub fn session_packages(&self) -> Vec<String> {
        self.packages.session_packages.clone().unwrap_or_else(|| {
            defaults::SESSION_PACKAGES
                .iter()
                .map(|s| (*s).to_string())
                .collect()
        })
    }

    /// Effective minimum package count
    #[must_use]
    pub fn min_package_count(&self) -> usize {
        self.packages
            .min_count
            .unwrap_or(defaults::MIN_PACKAGE_COUNT)
    }

    /// Effective directory exclusion patterns
    #[must_use]
    pub fn exclude_dirs(&self) -> Vec<String> {
        self.filesystem.exclude_dirs.clone().unwrap_or_else(|| {
            defaults::DEFAULT_EXCLUDE_DIRS
                .iter()
                .map(|s| (*s).to_string())
                .collect()
        })
    }

    /// Effective image builder command
    #[must_use]
    pub fn builder_command(&self) -> &str {
        self.builder
            .command
            .as_deref()
            .unwrap_or(defaults::DEFAULT_BUILDER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = ForgeConfig::default();
        assert_eq!(config.image_name(), "custom-arch");
        assert!(config.image_label().starts_with("ARCH_CUSTOM_"));
        assert_eq!(config.image_label().len(), "ARCH_CUSTOM_".len() + 6);
        assert!(config.include_custom_repos());
        assert_eq!(config.builder_command(), "mkarchiso");
        assert_eq!(config.min_package_count(), 10);
        assert!(config.session_packages().contains(&"gdm".to_string()));
        assert!(config.exclude_dirs().contains(&"node_modules".to_string()));
    }

    #[test]
    fn test_load_missing_file_returns_default() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        let config = ForgeConfig::load_from_path(&config_path).unwrap();
        assert!(config.image.name.is_none());
    }

    #[test]
    fn test_load_valid_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        let content = r#"
[image]
name = "myarch"
label = "MYARCH_2024"

[packages]
exclude = ["steam", "base"]
include_custom_repos = false

[user]
username = "alice"
copy_from = "bob"

[filesystem]
exclude_dirs = ["Videos"]
"#;
        fs::write(&config_path, content).unwrap();

        let config = ForgeConfig::load_from_path(&config_path).unwrap();
        assert_eq!(config.image_name(), "myarch");
        assert_eq!(config.image_label(), "MYARCH_2024");
        assert_eq!(config.packages.exclude, vec!["steam", "base"]);
        assert!(!config.include_custom_repos());
        assert_eq!(config.user.username.as_deref(), Some("alice"));
        assert_eq!(config.user.copy_from.as_deref(), Some("bob"));
        assert_eq!(config.exclude_dirs(), vec!["Videos"]);
    }

    #[test]
    fn test_load_invalid_toml_returns_error() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        fs::write(&config_path, "invalid toml [[[").unwrap();

        let result = ForgeConfig::load_from_path(&config_path);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_load_rejects_bad_username() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        fs::write(&config_path, "[user]\nusername = \"bad name; rm\"\n").unwrap();

        let result = ForgeConfig::load_from_path(&config_path);
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_load_rejects_unknown_keys() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        fs::write(&config_path, "[image]\nnmae = \"typo\"\n").unwrap();

        assert!(ForgeConfig::load_from_path(&config_path).is_err());
    }
}
