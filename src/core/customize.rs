//! Live root filesystem customization
//!
//! Writes the generated scripts and configuration fragments into the staged
//! profile's `airootfs` overlay and copies selected host configuration into
//! it. Host copies are best-effort; any failure to write a generated file
//! aborts the build.

use std::path::{Path, PathBuf};

use crate::config::defaults::HOME_COPY_EXCLUDES;
use crate::config::paths::EXCLUDE_DIRS_FILE;
use crate::core::build_config::BuildConfig;
use crate::core::events::Reporter;
use crate::core::report::BuildWarning;
use crate::core::scripts;
use crate::core::users;
use crate::error::PipelineError;
use crate::infra::filesystem;
use crate::infra::process::CommandRunner;

/// Files produced by [`customize_rootfs`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomizeReport {
    /// Generated files, in write order
    pub written: Vec<PathBuf>,
    /// Seeded home directory under `etc/skel`, when a host home was copied
    pub seeded_home: Option<PathBuf>,
    /// Non-fatal problems
    pub warnings: Vec<BuildWarning>,
}

/// Populate `<profile>/airootfs` for the live system
///
/// `packages` is the authoritative manifest list, written as
/// `root/pkglist.txt` for the installer.
pub fn customize_rootfs(
    config: &BuildConfig,
    packages: &[String],
    runner: &dyn CommandRunner,
    reporter: &Reporter,
) -> Result<CustomizeReport, PipelineError> {
    let airootfs = config.airootfs_dir();
    let root = airootfs.join("root");
    let mut report = CustomizeReport::default();

    let hostname = airootfs.join("etc/hostname");
    filesystem::write_file(&hostname, &format!("{}\n", config.hostname))?;
    report.written.push(hostname);

    copy_network_manager(config, &airootfs, reporter, &mut report);

    if let Some(source) = &config.user.copy_from {
        seed_home(config, source, &airootfs, runner, reporter, &mut report);
    } else {
        reporter.info("Using a blank template for the live user");
    }
    // A missing home falls back to the blank template, so only a completed
    // seed gets a restore script.
    let mut user = config.user.clone();
    if report.seeded_home.is_none() {
        user.copy_from = None;
    }

    let setup = root.join("setup_user.sh");
    filesystem::write_script(&setup, &scripts::setup_user_script(&user))?;
    report.written.push(setup);

    if user.copy_from.is_some() {
        let restore = root.join("restore_user_home.sh");
        filesystem::write_script(&restore, &scripts::restore_home_script(&user.username))?;
        report.written.push(restore);
    }

    let customize = root.join("customize_airootfs.sh");
    filesystem::write_script(&customize, &scripts::customize_airootfs_script(&user))?;
    report.written.push(customize);

    let pkglist = root.join("pkglist.txt");
    filesystem::write_file(&pkglist, &package_list(packages))?;
    report.written.push(pkglist);

    let installer = root.join("install.sh");
    filesystem::write_script(&installer, &scripts::installer_script(&user))?;
    report.written.push(installer);

    if !config.exclude_dirs.is_empty() {
        let exclude = config.profile_dir().join(EXCLUDE_DIRS_FILE);
        filesystem::write_file(&exclude, &package_list(&config.exclude_dirs))?;
        report.written.push(exclude);
    }

    reporter.info(format!(
        "Wrote {} customization files for user '{}'",
        report.written.len(),
        user.username
    ));
    Ok(report)
}

/// One entry per line, newline terminated
fn package_list(entries: &[String]) -> String {
    let mut content = entries.join("\n");
    if !content.is_empty() {
        content.push('\n');
    }
    content
}

fn copy_network_manager(
    config: &BuildConfig,
    airootfs: &Path,
    reporter: &Reporter,
    report: &mut CustomizeReport,
) {
    let source = &config.host.network_manager;
    if !source.is_dir() {
        tracing::debug!("No host NetworkManager configuration at {}", source.display());
        return;
    }
    let dest = airootfs.join("etc/NetworkManager");
    match filesystem::copy_tree(source, &dest) {
        Ok(()) => reporter.info("Copied NetworkManager configuration"),
        Err(e) => {
            let warning = BuildWarning::HostConfigNotCopied {
                path: source.clone(),
                message: e.to_string(),
            };
            reporter.warn(warning.to_string());
            report.warnings.push(warning);
        }
    }
}

/// `rsync` arguments copying `home` into `dest`, honoring the exclusion list
pub fn rsync_args(home: &Path, dest: &Path) -> Vec<String> {
    let mut args = vec!["-a".to_string()];
    args.extend(HOME_COPY_EXCLUDES.iter().map(|pattern| format!("--exclude={pattern}")));
    args.push(format!("{}/", home.display()));
    args.push(format!("{}/", dest.display()));
    args
}

fn seed_home(
    config: &BuildConfig,
    source: &str,
    airootfs: &Path,
    runner: &dyn CommandRunner,
    reporter: &Reporter,
    report: &mut CustomizeReport,
) {
    let home = users::home_of(&config.host.passwd, &config.host.home_base, source);
    if !home.is_dir() {
        let warning = BuildWarning::HomeNotFound {
            user: source.to_string(),
            path: home,
        };
        reporter.warn(warning.to_string());
        report.warnings.push(warning);
        return;
    }

    let dest = airootfs
        .join("etc/skel")
        .join(scripts::skel_dir_name(&config.user.username));
    if let Err(e) = filesystem::create_dir_all(&dest) {
        let warning = BuildWarning::HomeCopyIncomplete {
            user: source.to_string(),
            message: e.to_string(),
        };
        reporter.warn(warning.to_string());
        report.warnings.push(warning);
        return;
    }

    reporter.info(format!("Copying home of '{source}' from {}", home.display()));
    let args = rsync_args(&home, &dest);
    let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
    let failure = match runner.run("rsync", &arg_refs) {
        Ok(output) if output.success() => None,
        Ok(output) => Some(format!(
            "rsync exited with code {:?}: {}",
            output.code,
            output.stderr.trim()
        )),
        Err(e) => Some(e.to_string()),
    };
    if let Some(message) = failure {
        let warning = BuildWarning::HomeCopyIncomplete {
            user: source.to_string(),
            message,
        };
        reporter.warn(warning.to_string());
        report.warnings.push(warning);
    }
    // Partial copies are still restored on first boot.
    report.seeded_home = Some(dest);
}
