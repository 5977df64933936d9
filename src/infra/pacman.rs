//! pacman and repo-add invocations
//!
//! Thin wrapper over a [`CommandRunner`] that knows the pacman command lines
//! used by the pipeline. The package database is only ever queried; the one
//! install (`archiso` when missing) is an explicit tooling step.

use std::path::Path;

use crate::error::CommandError;
use crate::infra::process::{CommandOutput, CommandRunner};

/// pacman front-end
pub struct Pacman<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> Pacman<'a> {
    /// Create a front-end over the given runner
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }

    /// Names of explicitly installed packages (`pacman -Qqe`)
    pub fn explicit_packages(&self) -> Result<Vec<String>, CommandError> {
        let output = self.runner.run("pacman", &["-Qqe"])?.into_result("pacman")?;
        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect())
    }

    /// Whether a package resolves against the configured sync repositories
    ///
    /// Any failure, including failing to start pacman, answers `false`.
    pub fn in_sync_repositories(&self, package: &str) -> bool {
        match self.runner.run("pacman", &["-Si", package]) {
            Ok(output) => output.success(),
            Err(e) => {
                tracing::debug!("pacman -Si {} failed: {}", package, e);
                false
            }
        }
    }

    /// Whether a package is installed locally (`pacman -Q`)
    pub fn is_installed(&self, package: &str) -> bool {
        self.runner
            .run("pacman", &["-Q", package])
            .map(|output| output.success())
            .unwrap_or(false)
    }

    /// Refresh the sync databases and install a package
    pub fn install(&self, package: &str) -> Result<CommandOutput, CommandError> {
        self.runner
            .run("pacman", &["-Sy", "--noconfirm", package])?
            .into_result("pacman")
    }

    /// Build a repository database over the given package files
    pub fn repo_add(&self, database: &Path, packages: &[&Path]) -> Result<CommandOutput, CommandError> {
        let database = database.to_string_lossy();
        let packages: Vec<String> = packages
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        let mut args: Vec<&str> = vec![database.as_ref()];
        args.extend(packages.iter().map(String::as_str));

        self.runner.run("repo-add", &args)?.into_result("repo-add")
    }
}
