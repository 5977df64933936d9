//! Build attempt configuration
//!
//! [`BuildConfig`] bundles every input of one build attempt. It is assembled
//! from [`ForgeConfig`] plus command-line overrides, validated, and then only
//! read by the pipeline.

use std::path::PathBuf;

use crate::config::{defaults, paths};
use crate::core::global_config::ForgeConfig;
use crate::core::profile::ProfileIdentity;
use crate::error::ConfigError;
use crate::infra::dirs::ForgeDirs;

/// Live user account settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserConfig {
    /// Account name of the live user
    pub username: String,
    /// Password of the live user
    pub password: String,
    /// Root password
    pub root_password: String,
    /// Host account whose home seeds the live user's home
    pub copy_from: Option<String>,
    /// Log the live user in automatically when gdm is present
    pub autologin: bool,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            username: defaults::DEFAULT_USERNAME.to_string(),
            password: defaults::DEFAULT_USER_PASSWORD.to_string(),
            root_password: defaults::DEFAULT_ROOT_PASSWORD.to_string(),
            copy_from: None,
            autologin: true,
        }
    }
}

/// Host locations read during a build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPaths {
    /// Base profile copied into the work directory
    pub profile_source: PathBuf,
    /// pacman package cache
    pub package_cache: PathBuf,
    /// Host pacman configuration
    pub pacman_conf: PathBuf,
    /// Host NetworkManager configuration directory
    pub network_manager: PathBuf,
    /// Host account database
    pub passwd: PathBuf,
    /// Base of home directories when an account is not in `passwd`
    pub home_base: PathBuf,
}

impl Default for HostPaths {
    fn default() -> Self {
        Self {
            profile_source: PathBuf::from(paths::RELENG_PROFILE),
            package_cache: PathBuf::from(paths::PACMAN_CACHE),
            pacman_conf: PathBuf::from(paths::HOST_PACMAN_CONF),
            network_manager: PathBuf::from(paths::HOST_NETWORK_MANAGER),
            passwd: PathBuf::from(paths::HOST_PASSWD),
            home_base: PathBuf::from(paths::HOST_HOME),
        }
    }
}

/// Verification thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    /// Images at or below this size need a locatable payload
    pub min_image_bytes: u64,
    /// Payloads below this size raise a warning
    pub min_payload_bytes: u64,
    /// Package lists shorter than this raise a warning
    pub min_package_count: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            min_image_bytes: defaults::MIN_IMAGE_BYTES,
            min_payload_bytes: defaults::MIN_PAYLOAD_BYTES,
            min_package_count: defaults::MIN_PACKAGE_COUNT,
        }
    }
}

/// Inputs of one build attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfig {
    /// Work directory (wiped at start)
    pub work_dir: PathBuf,
    /// Output directory (wiped at start)
    pub output_dir: PathBuf,
    /// Image name prefix
    pub image_name: String,
    /// Volume label
    pub image_label: String,
    /// Publisher
    pub publisher: String,
    /// Application
    pub application: String,
    /// Live hostname
    pub hostname: String,
    /// Packages never to install
    pub exclusions: Vec<String>,
    /// Directory patterns excluded from the image
    pub exclude_dirs: Vec<String>,
    /// Live user account
    pub user: UserConfig,
    /// Include custom repositories and AUR packages
    pub include_custom_repos: bool,
    /// Packages added for the live graphical session
    pub session_packages: Vec<String>,
    /// Image builder command
    pub builder: String,
    /// Host locations
    pub host: HostPaths,
    /// Verification thresholds
    pub thresholds: Thresholds,
}

impl BuildConfig {
    /// Assemble the build configuration from the loaded config file
    pub fn from_config(config: &ForgeConfig, dirs: &ForgeDirs) -> Self {
        let user = &config.user;
        let host = HostPaths {
            profile_source: config.profile_source(),
            package_cache: config.package_cache(),
            ..HostPaths::default()
        };

        Self {
            work_dir: config.work_dir(dirs),
            output_dir: config.output_dir(dirs),
            image_name: config.image_name().to_string(),
            image_label: config.image_label(),
            publisher: config.publisher().to_string(),
            application: config.application().to_string(),
            hostname: config.hostname().to_string(),
            exclusions: config.packages.exclude.clone(),
            exclude_dirs: config.exclude_dirs(),
            user: UserConfig {
                username: user
                    .username
                    .clone()
                    .unwrap_or_else(|| defaults::DEFAULT_USERNAME.to_string()),
                password: user
                    .password
                    .clone()
                    .unwrap_or_else(|| defaults::DEFAULT_USER_PASSWORD.to_string()),
                root_password: user
                    .root_password
                    .clone()
                    .unwrap_or_else(|| defaults::DEFAULT_ROOT_PASSWORD.to_string()),
                copy_from: user.copy_from.clone().filter(|u| !u.is_empty()),
                autologin: user.autologin.unwrap_or(true),
            },
            include_custom_repos: config.include_custom_repos(),
            session_packages: config.session_packages(),
            builder: config.builder_command().to_string(),
            host,
            thresholds: Thresholds {
                min_package_count: config.min_package_count(),
                ..Thresholds::default()
            },
        }
    }

    /// Check values that end up in file names or generated scripts
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_account_name(&self.user.username) {
            return Err(ConfigError::Invalid {
                key: "user.username".to_string(),
                message: format!("'{}' is not a valid account name", self.user.username),
            });
        }
        if let Some(source) = &self.user.copy_from {
            if !is_account_name(source) {
                return Err(ConfigError::Invalid {
                    key: "user.copy_from".to_string(),
                    message: format!("'{source}' is not a valid account name"),
                });
            }
        }
        if self.image_name.is_empty() || self.image_name.contains('/') {
            return Err(ConfigError::Invalid {
                key: "image.name".to_string(),
                message: format!("'{}' cannot be used as a file name prefix", self.image_name),
            });
        }
        if self.work_dir == self.output_dir {
            return Err(ConfigError::Invalid {
                key: "paths.output_dir".to_string(),
                message: "work and output directories must differ".to_string(),
            });
        }
        Ok(())
    }

    /// Staged profile directory
    pub fn profile_dir(&self) -> PathBuf {
        self.work_dir.join("profile")
    }

    /// Image builder working directory
    pub fn build_dir(&self) -> PathBuf {
        self.work_dir.join("build")
    }

    /// Live root filesystem overlay
    pub fn airootfs_dir(&self) -> PathBuf {
        self.profile_dir().join(paths::AIROOTFS_DIR)
    }

    /// Identity values for `profiledef.sh`
    pub fn identity(&self) -> ProfileIdentity {
        ProfileIdentity {
            name: self.image_name.clone(),
            label: self.image_label.clone(),
            publisher: self.publisher.clone(),
            application: self.application.clone(),
        }
    }
}

/// Whether `name` is usable as a Linux account name
pub fn is_account_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 32
        && !name.starts_with('-')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BuildConfig {
        let forge = ForgeConfig::default();
        BuildConfig::from_config(&forge, &ForgeDirs::new())
    }

    #[test]
    fn test_defaults() {
        let config = config();

        assert_eq!(config.user, UserConfig::default());
        assert_eq!(config.user.username, "archuser");
        assert_eq!(config.user.root_password, "root");
        assert_eq!(config.builder, "mkarchiso");
        assert_eq!(config.host.package_cache, PathBuf::from("/var/cache/pacman/pkg"));
        assert_eq!(config.thresholds.min_package_count, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_derived_directories() {
        let mut config = config();
        config.work_dir = PathBuf::from("/tmp/w");

        assert_eq!(config.profile_dir(), PathBuf::from("/tmp/w/profile"));
        assert_eq!(config.build_dir(), PathBuf::from("/tmp/w/build"));
        assert_eq!(config.airootfs_dir(), PathBuf::from("/tmp/w/profile/airootfs"));
    }

    #[test]
    fn test_validate_rejects_unsafe_names() {
        let mut config = config();
        config.user.copy_from = Some("bob; rm -rf /".to_string());
        assert!(config.validate().is_err());

        let mut config = self::config();
        config.image_name = "../x".to_string();
        assert!(config.validate().is_err());

        let mut config = self::config();
        config.output_dir = config.work_dir.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_is_account_name() {
        assert!(is_account_name("archuser"));
        assert!(is_account_name("build_bot-2"));
        assert!(!is_account_name(""));
        assert!(!is_account_name("-x"));
        assert!(!is_account_name("a b"));
    }
}
