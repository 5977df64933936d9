//! Build pipeline orchestration
//!
//! Runs the stages of one build attempt strictly in order:
//!
//! 1. prepare work and output directories
//! 2. make sure the image builder is installed
//! 3. stage the base profile
//! 4. classify packages, synthesize the local repository, write the manifest
//! 5. customize the live root filesystem
//! 6. rewrite the profile definition
//! 7. run the image builder
//! 8. verify the artifact
//!
//! Cancellation is checked between stages and raced against the image
//! builder. Every attempt ends in exactly one [`BuildOutcome`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio_util::sync::CancellationToken;

use crate::core::build_config::BuildConfig;
use crate::core::classify::{self, Inventory};
use crate::core::customize;
use crate::core::driver::{self, DriverOutcome};
use crate::core::events::Reporter;
use crate::core::local_repo;
use crate::core::manifest::{self, ManifestReport};
use crate::core::profile;
use crate::core::progress::{Milestone, ProgressTracker};
use crate::core::report::{format_size, BuildOutcome, BuildReport, BuildWarning, PayloadStatus};
use crate::core::verify;
use crate::error::{FilesystemError, PipelineError};
use crate::infra::filesystem;
use crate::infra::pacman::Pacman;
use crate::infra::process::CommandRunner;

/// One build attempt
pub struct Pipeline {
    config: BuildConfig,
    runner: Arc<dyn CommandRunner>,
    reporter: Reporter,
    cancel: CancellationToken,
    reuse_max_age: Option<Duration>,
    tracker: ProgressTracker,
    warnings: Vec<BuildWarning>,
}

impl Pipeline {
    /// Create a pipeline for `config` running host commands through `runner`
    pub fn new(config: BuildConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            config,
            runner,
            reporter: Reporter::silent(),
            cancel: CancellationToken::new(),
            reuse_max_age: None,
            tracker: ProgressTracker::new(),
            warnings: Vec::new(),
        }
    }

    /// Deliver log lines and progress through `reporter`
    #[must_use]
    pub fn with_reporter(mut self, reporter: Reporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// Stop at the next checkpoint once `cancel` fires
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Reuse an image younger than `max_age` instead of building
    #[must_use]
    pub fn with_reuse_recent(mut self, max_age: Duration) -> Self {
        self.reuse_max_age = Some(max_age);
        self
    }

    /// Run the attempt to its terminal state
    pub async fn run(mut self) -> BuildOutcome {
        match self.execute().await {
            Ok(Some(report)) => {
                self.reporter.info(format!(
                    "Build completed: {} ({})",
                    report.image.display(),
                    format_size(report.image_size)
                ));
                BuildOutcome::Succeeded(Box::new(report))
            }
            Ok(None) => {
                self.reporter.warn("Build cancelled by operator");
                BuildOutcome::Cancelled
            }
            Err(e) => {
                self.reporter.error(format!("Build failed: {e}"));
                BuildOutcome::Failed(e)
            }
        }
    }

    /// `Ok(None)` means the operator cancelled
    async fn execute(&mut self) -> Result<Option<BuildReport>, PipelineError> {
        if let Some(max_age) = self.reuse_max_age {
            if let Some(report) = self.reuse_recent(max_age)? {
                return Ok(Some(report));
            }
        }

        self.prepare()?;
        if self.cancel.is_cancelled() {
            return Ok(None);
        }

        self.check_tooling()?;
        if self.cancel.is_cancelled() {
            return Ok(None);
        }

        self.stage_profile()?;
        if self.cancel.is_cancelled() {
            return Ok(None);
        }

        let manifest = self.write_manifest()?;
        if self.cancel.is_cancelled() {
            return Ok(None);
        }

        self.customize(&manifest.packages)?;
        if self.cancel.is_cancelled() {
            return Ok(None);
        }

        self.reporter.info("Updating profile definition");
        profile::rewrite_profiledef(&self.config.profile_dir(), &self.config.identity())?;
        self.reach(Milestone::RootfsBuilding);
        if self.cancel.is_cancelled() {
            return Ok(None);
        }

        let result = match driver::run_builder(&self.config, &mut self.tracker, &self.reporter, &self.cancel).await? {
            DriverOutcome::Cancelled => return Ok(None),
            DriverOutcome::Exited(result) => result,
        };

        self.reporter.info("Verifying image");
        let verification = verify::verify_artifact(
            &self.config.build_dir(),
            &self.config.output_dir,
            result.exit_code,
            &result.fatal_signals,
            &self.config.thresholds,
        )?;
        for warning in verification.warnings {
            self.warn(warning);
        }
        match &verification.payload {
            PayloadStatus::Found { path, size } => self.reporter.info(format!(
                "Found squashfs payload {} ({})",
                path.display(),
                format_size(*size)
            )),
            PayloadStatus::PresumedEmbedded => self
                .reporter
                .info("squashfs payload not on disk; image size indicates it is embedded"),
        }
        self.reporter.info(format!("Image type: {}", verification.signature));

        Ok(Some(BuildReport {
            image: verification.image,
            image_size: verification.image_size,
            payload: verification.payload,
            signature: verification.signature,
            exit_code: result.exit_code,
            package_count: manifest.count,
            fatal_signals: result.fatal_signals,
            warnings: std::mem::take(&mut self.warnings),
            reused: false,
        }))
    }

    fn reach(&mut self, milestone: Milestone) {
        if let Some(percent) = self.tracker.reach(milestone) {
            self.reporter.progress(percent);
        }
    }

    fn warn(&mut self, warning: BuildWarning) {
        self.reporter.warn(warning.to_string());
        self.warnings.push(warning);
    }

    fn reuse_recent(&mut self, max_age: Duration) -> Result<Option<BuildReport>, PipelineError> {
        let Some(image) = find_recent_image(&self.config.output_dir, &self.config.image_name, max_age) else {
            self.reporter.info("No recent image to reuse; building");
            return Ok(None);
        };

        let image_size = image
            .metadata()
            .map_err(|e| FilesystemError::ReadFile {
                path: image.clone(),
                error: e.to_string(),
            })?
            .len();
        self.reporter.warn(format!(
            "Reusing {} from an earlier build; it was not validated against the current configuration",
            image.display()
        ));
        self.reach(Milestone::Done);

        Ok(Some(BuildReport {
            signature: verify::read_signature(&image),
            image,
            image_size,
            payload: PayloadStatus::PresumedEmbedded,
            exit_code: None,
            package_count: 0,
            fatal_signals: Vec::new(),
            warnings: Vec::new(),
            reused: true,
        }))
    }

    fn prepare(&mut self) -> Result<(), PipelineError> {
        self.reporter.info("Preparing work and output directories");
        filesystem::recreate_dir(&self.config.work_dir)?;
        filesystem::recreate_dir(&self.config.output_dir)?;

        if let Some(parent) = self.config.output_dir.parent() {
            for stale in stale_images(parent, &self.config.image_name) {
                self.reporter.info(format!("Removing old image {}", stale.display()));
                filesystem::remove_file(&stale)?;
            }
        }
        self.reach(Milestone::Started);
        Ok(())
    }

    fn check_tooling(&mut self) -> Result<(), PipelineError> {
        self.reporter.info("Checking for archiso");
        let pacman = Pacman::new(self.runner.as_ref());
        if profile::ensure_builder_installed(&pacman)? {
            self.reporter.info("Installed archiso");
        }
        self.reach(Milestone::ToolingVerified);
        Ok(())
    }

    fn stage_profile(&mut self) -> Result<(), PipelineError> {
        let profile_dir = self.config.profile_dir();
        self.reporter.info(format!(
            "Copying base profile from {}",
            self.config.host.profile_source.display()
        ));
        profile::stage_profile(&self.config.host.profile_source, &profile_dir)?;

        if self.config.include_custom_repos {
            match profile::adopt_host_pacman_conf(&self.config.host.pacman_conf, &profile_dir) {
                Ok(()) => self.reporter.info("Using host pacman.conf for custom repositories"),
                Err(e) => self.warn(BuildWarning::HostConfigNotCopied {
                    path: self.config.host.pacman_conf.clone(),
                    message: e.to_string(),
                }),
            }
        }
        self.reach(Milestone::ProfileCopied);
        Ok(())
    }

    fn write_manifest(&mut self) -> Result<ManifestReport, PipelineError> {
        let profile_dir = self.config.profile_dir();
        let runner = Arc::clone(&self.runner);
        let pacman = Pacman::new(runner.as_ref());

        let installed = pacman.explicit_packages()?;
        self.reporter.info(format!("Classifying {} installed packages", installed.len()));
        let inventory = classify::classify(&pacman, &installed, |done, total| {
            if done % 100 == 0 || done == total {
                tracing::debug!("Classified {done}/{total} packages");
            }
        });
        self.reporter.info(format!(
            "{} repository packages, {} non-repository packages",
            inventory.repository().len(),
            inventory.non_repository().len()
        ));

        let mut candidates = self.select_candidates(&pacman, &inventory, &profile_dir)?;

        let (excluded, wanted): (Vec<String>, Vec<String>) = self
            .config
            .session_packages
            .iter()
            .cloned()
            .partition(|package| self.config.exclusions.iter().any(|e| e.trim() == package));
        candidates.extend(wanted);
        for package in excluded {
            self.warn(BuildWarning::SessionPackageExcluded { package });
        }

        self.reporter.info("Writing package list");
        let manifest = manifest::build_manifest(&profile_dir, &candidates, &self.config.exclusions)?;
        if !manifest.ignored_exclusions.is_empty() {
            self.warn(BuildWarning::IgnoredExclusions {
                packages: manifest.ignored_exclusions.clone(),
            });
        }
        let missing = manifest.missing_required();
        if !missing.is_empty() {
            return Err(PipelineError::RequiredPackageMissingAfterBuild { packages: missing });
        }
        if manifest.count < self.config.thresholds.min_package_count {
            self.warn(BuildWarning::PackageListTooSmall {
                count: manifest.count,
                minimum: self.config.thresholds.min_package_count,
            });
        }
        self.reporter.info(format!(
            "Package list has {} packages ({} added from this system)",
            manifest.count,
            manifest.custom_additions.len()
        ));
        self.reach(Milestone::ManifestWritten);
        Ok(manifest)
    }

    /// Packages offered to the manifest builder
    ///
    /// Non-repository packages only qualify once their artifact is staged in
    /// the local repository.
    fn select_candidates(
        &mut self,
        pacman: &Pacman<'_>,
        inventory: &Inventory,
        profile_dir: &Path,
    ) -> Result<Vec<String>, PipelineError> {
        let mut candidates = inventory.repository();

        if !self.config.include_custom_repos {
            let skips = classify::split_official_only(inventory);
            if !skips.aur.is_empty() || !skips.distro_specific.is_empty() {
                self.warn(BuildWarning::NonRepositorySkipped {
                    distro_specific: skips.distro_specific,
                    aur: skips.aur,
                });
            }
            return Ok(candidates);
        }

        let (excluded, _) = manifest::split_exclusions(&self.config.exclusions, &manifest::required_set());
        let non_repository: Vec<String> = inventory
            .non_repository()
            .into_iter()
            .filter(|package| !excluded.contains(package))
            .collect();
        if non_repository.is_empty() {
            return Ok(candidates);
        }

        self.reporter.info(format!(
            "Staging {} non-repository packages into the local repository",
            non_repository.len()
        ));
        let staging = local_repo::stage_packages(&self.config.host.package_cache, profile_dir, &non_repository)?;
        if !staging.failed.is_empty() {
            self.warn(BuildWarning::UnstagedPackages {
                packages: staging.failed.clone(),
            });
        }
        if local_repo::register_repository(pacman, profile_dir, &staging)? {
            self.reporter.info(format!(
                "Local repository created with {} packages",
                staging.staged.len()
            ));
        }
        candidates.extend(staging.staged_names());
        Ok(candidates)
    }

    fn customize(&mut self, packages: &[String]) -> Result<(), PipelineError> {
        self.reporter.info("Customizing live root filesystem");
        let report = customize::customize_rootfs(&self.config, packages, self.runner.as_ref(), &self.reporter)?;
        // Already reported by the customizer.
        self.warnings.extend(report.warnings);
        self.reach(Milestone::PackagesInstalling);
        Ok(())
    }
}

/// Whether `file_name` is an image named with `prefix`
fn is_image_named(file_name: &str, prefix: &str) -> bool {
    file_name.starts_with(prefix) && file_name.ends_with(".iso")
}

/// Images named with `prefix` directly inside `dir`
pub fn stale_images(dir: &Path, prefix: &str) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut images: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| is_image_named(n, prefix))
        })
        .collect();
    images.sort();
    images
}

/// Newest image named with `prefix` in `dir` modified within `max_age`
pub fn find_recent_image(dir: &Path, prefix: &str, max_age: Duration) -> Option<PathBuf> {
    let now = SystemTime::now();
    stale_images(dir, prefix)
        .into_iter()
        .filter_map(|path| {
            let modified = path.metadata().and_then(|m| m.modified()).ok()?;
            let age = now.duration_since(modified).unwrap_or_default();
            (age < max_age).then_some((modified, path))
        })
        .max_by(|a, b| a.0.cmp(&b.0))
        .map(|(_, path)| path)
}
