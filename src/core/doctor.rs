//! Doctor command logic
//!
//! Checks host prerequisites for building and writing images and reports
//! issues with suggestions.

use std::path::Path;

use serde::Serialize;

use crate::config::paths::PACKAGES_FILE;
use crate::core::build_config::BuildConfig;
use crate::infra::process;

/// What a failing check prevents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Gate {
    /// Building an image at all
    Build,
    /// Seeding the live user's home from a host account
    HomeSeeding,
    /// Writing the image to removable media
    MediaWrite,
    /// Running the embedded installer (checked on the build host as a hint)
    Installer,
}

impl Gate {
    /// Short description of the affected feature
    pub fn feature(self) -> &'static str {
        match self {
            Self::Build => "image builds",
            Self::HomeSeeding => "--copy-from-user",
            Self::MediaWrite => "isoforge write",
            Self::Installer => "the installer",
        }
    }
}

/// Outcome of one prerequisite check
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    /// What was checked
    pub name: String,
    /// `true` when the prerequisite is present
    pub ok: bool,
    /// Reported version, when the tool prints one
    pub version: Option<String>,
    /// Why the check failed
    pub problem: Option<String>,
    /// How to fix it
    pub fix: Option<String>,
    /// Feature that cannot work without it
    pub gate: Gate,
}

impl CheckResult {
    fn present(name: &str, version: Option<String>, gate: Gate) -> Self {
        Self {
            name: name.to_string(),
            ok: true,
            version,
            problem: None,
            fix: None,
            gate,
        }
    }

    fn absent(name: &str, problem: String, fix: Option<String>, gate: Gate) -> Self {
        Self {
            name: name.to_string(),
            ok: false,
            version: None,
            problem: Some(problem),
            fix,
            gate,
        }
    }

    /// Whether a failure stops builds
    pub fn blocks_build(&self) -> bool {
        !self.ok && self.gate == Gate::Build
    }
}

/// Everything `isoforge doctor` found
#[derive(Debug, Default, Serialize)]
pub struct DoctorReport {
    /// Tool and host checks, in the order they ran
    pub checks: Vec<CheckResult>,
    /// Problems with the effective configuration
    pub config_issues: Vec<String>,
}

impl DoctorReport {
    /// Record a configuration problem
    pub fn add_config_issue(&mut self, issue: String) {
        self.config_issues.push(issue);
    }

    /// A build can start: nothing gating builds failed and the config is usable
    pub fn ready_to_build(&self) -> bool {
        !self.checks.iter().any(CheckResult::blocks_build) && self.config_issues.is_empty()
    }

    /// Every check passed
    pub fn fully_ready(&self) -> bool {
        self.ready_to_build() && self.checks.iter().all(|c| c.ok)
    }

    /// Number of passing checks
    pub fn ok_count(&self) -> usize {
        self.checks.iter().filter(|c| c.ok).count()
    }

    /// Failed checks that stop builds
    pub fn blockers(&self) -> Vec<&CheckResult> {
        self.checks.iter().filter(|c| c.blocks_build()).collect()
    }

    /// Features unavailable because of failed checks that do not stop builds
    pub fn degraded_features(&self) -> Vec<&'static str> {
        let mut features: Vec<&'static str> = self
            .checks
            .iter()
            .filter(|c| !c.ok && c.gate != Gate::Build)
            .map(|c| c.gate.feature())
            .collect();
        features.dedup();
        features
    }
}

/// A host tool the doctor looks for
struct Tool {
    name: &'static str,
    program: &'static str,
    version_arg: Option<&'static str>,
    package: &'static str,
    gate: Gate,
}

const TOOLS: &[Tool] = &[
    Tool {
        name: "pacman",
        program: "pacman",
        version_arg: Some("--version"),
        package: "pacman",
        gate: Gate::Build,
    },
    Tool {
        name: "Image builder (mkarchiso)",
        program: "mkarchiso",
        version_arg: None,
        package: "archiso",
        gate: Gate::Build,
    },
    Tool {
        name: "repo-add",
        program: "repo-add",
        version_arg: Some("--version"),
        package: "pacman",
        gate: Gate::Build,
    },
    Tool {
        name: "rsync",
        program: "rsync",
        version_arg: Some("--version"),
        package: "rsync",
        gate: Gate::HomeSeeding,
    },
    Tool {
        name: "dd",
        program: "dd",
        version_arg: Some("--version"),
        package: "coreutils",
        gate: Gate::MediaWrite,
    },
    Tool {
        name: "lsblk",
        program: "lsblk",
        version_arg: Some("--version"),
        package: "util-linux",
        gate: Gate::MediaWrite,
    },
    Tool {
        name: "sgdisk",
        program: "sgdisk",
        version_arg: Some("--version"),
        package: "gptfdisk",
        gate: Gate::Installer,
    },
];

/// Version printed by `program version_arg`, if it runs successfully
pub fn query_version(program: &str, version_arg: &str) -> Option<String> {
    let output = std::process::Command::new(program).arg(version_arg).output().ok()?;
    if !output.status.success() {
        return None;
    }
    // Some tools print their banner on stderr.
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    first_version(&text)
}

/// First dotted version number in `text`
fn first_version(text: &str) -> Option<String> {
    let Ok(pattern) = regex::Regex::new(r"v?(\d+\.\d+(?:\.\d+)?(?:-\w+)?)") else {
        return None;
    };
    pattern
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn check_tool(tool: &Tool) -> CheckResult {
    if process::tool_available(tool.program) {
        let version = tool.version_arg.and_then(|arg| query_version(tool.program, arg));
        return CheckResult::present(tool.name, version, tool.gate);
    }
    CheckResult::absent(
        tool.name,
        format!("{} not found in PATH", tool.program),
        Some(format!("pacman -S {}", tool.package)),
        tool.gate,
    )
}

/// Builds and media writes need root
pub fn check_root() -> CheckResult {
    const NAME: &str = "Root privileges";
    if process::running_as_root() {
        return CheckResult::present(NAME, None, Gate::Build);
    }
    CheckResult::absent(
        NAME,
        "not running as root".to_string(),
        Some("sudo isoforge ...".to_string()),
        Gate::Build,
    )
}

/// The base profile must carry a package list
pub fn check_profile(source: &Path) -> CheckResult {
    const NAME: &str = "Base profile";
    if source.join(PACKAGES_FILE).is_file() {
        return CheckResult::present(NAME, None, Gate::Build);
    }
    CheckResult::absent(
        NAME,
        format!("{} has no {PACKAGES_FILE}", source.display()),
        Some("pacman -S archiso, or set paths.profile_source".to_string()),
        Gate::Build,
    )
}

/// Check the build configuration for unusable values
pub fn check_build_config(config: &BuildConfig) -> Vec<String> {
    let mut issues = Vec::new();
    if let Err(e) = config.validate() {
        issues.push(e.to_string());
    }
    if !config.host.package_cache.is_dir() {
        issues.push(format!(
            "Package cache {} does not exist; non-repository packages cannot be staged",
            config.host.package_cache.display()
        ));
    }
    issues
}

/// Probe the host; `config` adds the base profile and configuration checks
pub fn run_doctor(config: Option<&BuildConfig>) -> DoctorReport {
    let mut checks = vec![check_root()];
    checks.extend(TOOLS.iter().map(check_tool));

    let mut config_issues = Vec::new();
    if let Some(config) = config {
        checks.push(check_profile(&config.host.profile_source));
        config_issues = check_build_config(config);
    }

    DoctorReport { checks, config_issues }
}
