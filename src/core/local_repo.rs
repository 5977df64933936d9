//! Local package repository synthesis
//!
//! Packages that do not resolve against the sync repositories are copied
//! from the pacman cache into `airootfs/opt/local-repo`, indexed with
//! `repo-add`, and registered in the staged profile's `pacman.conf`.
//! A package with no cached artifact is reported and left out; it never
//! affects the staging of other packages.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::config::paths::{AIROOTFS_DIR, LOCAL_REPO_NAME, LOCAL_REPO_REL, PROFILE_PACMAN_CONF};
use crate::error::PipelineError;
use crate::infra::filesystem;
use crate::infra::pacman::Pacman;

/// A package artifact copied into the local repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalRepoEntry {
    /// Package name
    pub package: String,
    /// Artifact path in the package cache
    pub cache_path: PathBuf,
    /// Artifact path inside the local repository
    pub staged_path: PathBuf,
}

/// Result of staging non-repository packages
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagingReport {
    /// Local repository directory inside the profile
    pub repo_dir: PathBuf,
    /// Packages copied into the repository
    pub staged: Vec<LocalRepoEntry>,
    /// Packages with no usable cached artifact
    pub failed: Vec<String>,
}

impl StagingReport {
    /// Names of staged packages
    pub fn staged_names(&self) -> Vec<String> {
        self.staged.iter().map(|e| e.package.clone()).collect()
    }

    /// Repository database path
    pub fn database(&self) -> PathBuf {
        self.repo_dir.join(format!("{LOCAL_REPO_NAME}.db.tar.gz"))
    }
}

/// The `pacman.conf` stanza registering the local repository
pub fn repository_stanza() -> String {
    format!("\n[{LOCAL_REPO_NAME}]\nSigLevel = Optional TrustAll\nServer = file:///{LOCAL_REPO_REL}\n")
}

/// Whether a cache file name is a package artifact of `package`
///
/// Matches `<package>-<version>-<release>-<arch>.pkg.tar.<ext>` exactly, so
/// `foo` does not pick up `foo-git-1.0-1-x86_64.pkg.tar.zst`. Signatures are
/// never artifacts.
pub fn is_artifact_of(file_name: &str, package: &str) -> bool {
    if file_name.ends_with(".sig") {
        return false;
    }
    let Some(rest) = file_name
        .strip_prefix(package)
        .and_then(|r| r.strip_prefix('-'))
    else {
        return false;
    };
    let Some((stem, _ext)) = rest.split_once(".pkg.tar") else {
        return false;
    };
    let fields: Vec<&str> = stem.split('-').collect();
    fields.len() == 3 && fields.iter().all(|f| !f.is_empty())
}

/// Find the most recently modified cached artifact of `package`
pub fn find_cached_artifact(cache_dir: &Path, package: &str) -> Option<PathBuf> {
    let entries = match fs::read_dir(cache_dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!("Cannot read package cache {}: {}", cache_dir.display(), e);
            return None;
        }
    };

    entries
        .filter_map(Result::ok)
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| is_artifact_of(name, package))
        })
        .filter_map(|entry| {
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            entry.path().is_file().then(|| (modified, entry.path()))
        })
        .max_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)))
        .map(|(_, path)| path)
}

/// Copy cached artifacts of `packages` into the profile's local repository
///
/// Only failing to create the repository directory is fatal.
pub fn stage_packages(
    cache_dir: &Path,
    profile_dir: &Path,
    packages: &[String],
) -> Result<StagingReport, PipelineError> {
    let repo_dir = profile_dir.join(AIROOTFS_DIR).join(LOCAL_REPO_REL);
    filesystem::create_dir_all(&repo_dir)?;

    let mut report = StagingReport {
        repo_dir,
        ..StagingReport::default()
    };

    for package in packages {
        let Some(cache_path) = find_cached_artifact(cache_dir, package) else {
            tracing::warn!("Package file not found in cache: {} (excluded from image)", package);
            report.failed.push(package.clone());
            continue;
        };
        let Some(file_name) = cache_path.file_name() else {
            report.failed.push(package.clone());
            continue;
        };
        let staged_path = report.repo_dir.join(file_name);

        match filesystem::copy_file(&cache_path, &staged_path) {
            Ok(_) => {
                tracing::info!("Staged {}", cache_path.display());
                report.staged.push(LocalRepoEntry {
                    package: package.clone(),
                    cache_path,
                    staged_path,
                });
            }
            Err(e) => {
                tracing::warn!("{} (excluded from image)", e);
                report.failed.push(package.clone());
            }
        }
    }

    Ok(report)
}

/// Index the staged artifacts and register the repository in the staged
/// `pacman.conf`
///
/// Does nothing and returns `false` when no package was staged. The host
/// configuration is never touched.
pub fn register_repository(
    pacman: &Pacman<'_>,
    profile_dir: &Path,
    report: &StagingReport,
) -> Result<bool, PipelineError> {
    if report.staged.is_empty() {
        return Ok(false);
    }

    let artifacts: Vec<&Path> = report.staged.iter().map(|e| e.staged_path.as_path()).collect();
    pacman.repo_add(&report.database(), &artifacts)?;

    filesystem::append_file(&profile_dir.join(PROFILE_PACMAN_CONF), &repository_stanza())?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::process::{CommandOutput, ScriptedRunner};
    use std::fs::File;
    use std::time::Duration;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str, age_secs: u64) -> PathBuf {
        let path = dir.join(name);
        let file = File::create(&path).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(age_secs))
            .unwrap();
        path
    }

    #[test]
    fn test_is_artifact_of() {
        assert!(is_artifact_of("yay-12.3.5-1-x86_64.pkg.tar.zst", "yay"));
        assert!(is_artifact_of("yay-1:2.0-3-any.pkg.tar.xz", "yay"));
        assert!(!is_artifact_of("yay-12.3.5-1-x86_64.pkg.tar.zst.sig", "yay"));
        assert!(!is_artifact_of("yay-bin-12.3.5-1-x86_64.pkg.tar.zst", "yay"));
        assert!(!is_artifact_of("yay-12.3.5-1.tar.gz", "yay"));
        assert!(!is_artifact_of("yaya-1-1-x86_64.pkg.tar.zst", "yay"));
    }

    #[test]
    fn test_find_cached_artifact_picks_newest() {
        let cache = TempDir::new().unwrap();
        touch(cache.path(), "yay-12.0-1-x86_64.pkg.tar.zst", 500);
        let newest = touch(cache.path(), "yay-12.1-1-x86_64.pkg.tar.zst", 10);
        touch(cache.path(), "yay-12.1-1-x86_64.pkg.tar.zst.sig", 0);

        assert_eq!(find_cached_artifact(cache.path(), "yay"), Some(newest));
        assert_eq!(find_cached_artifact(cache.path(), "paru"), None);
    }

    #[test]
    fn test_stage_packages_isolates_failures() {
        let cache = TempDir::new().unwrap();
        let profile = TempDir::new().unwrap();
        touch(cache.path(), "yay-12.0-1-x86_64.pkg.tar.zst", 0);
        touch(cache.path(), "zoom-6.0-1-x86_64.pkg.tar.zst", 0);

        let report = stage_packages(
            cache.path(),
            profile.path(),
            &["yay".to_string(), "missing".to_string(), "zoom".to_string()],
        )
        .unwrap();

        assert_eq!(report.staged_names(), vec!["yay", "zoom"]);
        assert_eq!(report.failed, vec!["missing"]);
        assert!(report.repo_dir.join("yay-12.0-1-x86_64.pkg.tar.zst").exists());
        assert!(report.repo_dir.ends_with("airootfs/opt/local-repo"));
    }

    #[test]
    fn test_register_repository_skips_empty_staging() {
        let profile = TempDir::new().unwrap();
        let runner = ScriptedRunner::new();
        let pacman = Pacman::new(&runner);

        let registered = register_repository(&pacman, profile.path(), &StagingReport::default()).unwrap();

        assert!(!registered);
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_register_repository_appends_stanza() {
        let cache = TempDir::new().unwrap();
        let profile = TempDir::new().unwrap();
        fs::write(profile.path().join(PROFILE_PACMAN_CONF), "[core]\nInclude = x\n").unwrap();
        touch(cache.path(), "yay-12.0-1-x86_64.pkg.tar.zst", 0);
        let report = stage_packages(cache.path(), profile.path(), &["yay".to_string()]).unwrap();
        let runner = ScriptedRunner::new();
        let pacman = Pacman::new(&runner);

        assert!(register_repository(&pacman, profile.path(), &report).unwrap());

        let conf = fs::read_to_string(profile.path().join(PROFILE_PACMAN_CONF)).unwrap();
        assert_eq!(
            conf,
            "[core]\nInclude = x\n\n[local-repo]\nSigLevel = Optional TrustAll\nServer = file:///opt/local-repo\n"
        );
        assert_eq!(runner.calls().len(), 1);
        assert!(runner.calls()[0].starts_with("repo-add "));
    }

    #[test]
    fn test_register_repository_propagates_repo_add_failure() {
        let cache = TempDir::new().unwrap();
        let profile = TempDir::new().unwrap();
        touch(cache.path(), "yay-12.0-1-x86_64.pkg.tar.zst", 0);
        let report = stage_packages(cache.path(), profile.path(), &["yay".to_string()]).unwrap();
        let runner = ScriptedRunner::new().fallback(CommandOutput::failed(1, "repo-add: bad"));
        let pacman = Pacman::new(&runner);

        let err = register_repository(&pacman, profile.path(), &report).unwrap_err();

        assert!(matches!(err, PipelineError::Command(_)));
        assert!(!profile.path().join(PROFILE_PACMAN_CONF).exists());
    }
}
