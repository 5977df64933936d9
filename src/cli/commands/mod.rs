//! CLI command implementations
//!
//! Each command is implemented in its own submodule.

pub mod build;
pub mod clean;
pub mod config;
pub mod devices;
pub mod doctor;
pub mod packages;
pub mod users;
pub mod write;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;

use crate::core::build_config::BuildConfig;
use crate::core::global_config::ForgeConfig;
use crate::infra::dirs::ForgeDirs;

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build an image from this system
    Build(build::BuildArgs),

    /// Write an image to a removable device
    Write {
        /// Image file to write
        image: PathBuf,

        /// Target device (for example /dev/sdb)
        #[arg(short, long)]
        device: PathBuf,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Classify installed packages by origin
    Packages {
        /// Show only packages not found in the sync repositories
        #[arg(long)]
        non_repo_only: bool,
    },

    /// List removable block devices
    Devices,

    /// List host accounts whose home can seed the live user
    Users,

    /// Check system dependencies
    Doctor,

    /// Remove work and output directories
    Clean,

    /// Show the effective configuration
    Config,
}

impl Commands {
    /// Execute the command
    pub async fn run(self) -> Result<()> {
        match self {
            Self::Build(args) => build::execute(args).await,
            Self::Write { image, device, yes } => write::execute(&image, &device, yes).await,
            Self::Packages { non_repo_only } => packages::execute(non_repo_only).await,
            Self::Devices => devices::execute().await,
            Self::Users => users::execute().await,
            Self::Doctor => doctor::execute().await,
            Self::Clean => clean::execute().await,
            Self::Config => config::execute().await,
        }
    }
}

/// Load `config.toml` and derive the build configuration from it
pub(crate) fn load_config() -> Result<(ForgeDirs, ForgeConfig, BuildConfig)> {
    let dirs = ForgeDirs::new();
    let forge = ForgeConfig::load(&dirs)
        .with_context(|| format!("Failed to load {}", dirs.config_path().display()))?;
    let build = BuildConfig::from_config(&forge, &dirs);
    Ok((dirs, forge, build))
}
