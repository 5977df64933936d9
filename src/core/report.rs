//! Build results

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::error::PipelineError;

/// Non-fatal conditions recorded during a build
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum BuildWarning {
    /// Exclusions naming required packages were ignored
    IgnoredExclusions { packages: Vec<String> },
    /// Non-repository packages with no cached artifact were left out
    UnstagedPackages { packages: Vec<String> },
    /// Non-repository packages dropped in official-only mode
    NonRepositorySkipped {
        distro_specific: Vec<String>,
        aur: Vec<String>,
    },
    /// A live-session package is excluded by the operator
    SessionPackageExcluded { package: String },
    /// The package list is shorter than the configured minimum
    PackageListTooSmall { count: usize, minimum: usize },
    /// The seeding account has no home directory; a blank template is used
    HomeNotFound { user: String, path: PathBuf },
    /// Copying the seeding account's home did not complete
    HomeCopyIncomplete { user: String, message: String },
    /// Host configuration could not be copied into the image
    HostConfigNotCopied { path: PathBuf, message: String },
    /// The squashfs payload is smaller than expected
    SuspiciouslySmallPayload { path: PathBuf, size: u64 },
    /// The image builder exited non-zero but produced a passing image
    NonZeroExit { code: Option<i32> },
}

impl fmt::Display for BuildWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IgnoredExclusions { packages } => write!(
                f,
                "Ignoring exclusions for required packages: {}",
                packages.join(", ")
            ),
            Self::UnstagedPackages { packages } => write!(
                f,
                "Excluding {} packages with no cached package file: {}",
                packages.len(),
                packages.join(", ")
            ),
            Self::NonRepositorySkipped { distro_specific, aur } => write!(
                f,
                "Skipping {} AUR packages and {} distribution-specific packages",
                aur.len(),
                distro_specific.len()
            ),
            Self::SessionPackageExcluded { package } => write!(
                f,
                "Live-session package '{package}' is excluded; the graphical session may not start"
            ),
            Self::PackageListTooSmall { count, minimum } => write!(
                f,
                "Package list is very small ({count} packages, expected at least {minimum}); the image may not boot"
            ),
            Self::HomeNotFound { user, path } => write!(
                f,
                "Home directory of '{user}' not found at {}; using a blank template",
                path.display()
            ),
            Self::HomeCopyIncomplete { user, message } => {
                write!(f, "Some files from the home of '{user}' were not copied: {message}")
            }
            Self::HostConfigNotCopied { path, message } => {
                write!(f, "Could not copy {}: {message}", path.display())
            }
            Self::SuspiciouslySmallPayload { path, size } => write!(
                f,
                "squashfs payload {} is only {} and may be corrupt or empty",
                path.display(),
                format_size(*size)
            ),
            Self::NonZeroExit { code } => write!(
                f,
                "Image builder exited with code {code:?}, but the image passed verification"
            ),
        }
    }
}

/// Where the squashfs payload was found
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum PayloadStatus {
    /// Payload located on disk
    Found { path: PathBuf, size: u64 },
    /// Not on disk, but the image is large enough to contain it
    PresumedEmbedded,
}

/// Recognized image signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImageSignature {
    /// ISO 9660 volume descriptor
    Iso9660,
    /// MBR boot signature only
    BootSector,
    /// Neither
    Unknown,
}

impl fmt::Display for ImageSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Iso9660 => write!(f, "ISO 9660 (bootable)"),
            Self::BootSector => write!(f, "DOS/MBR boot sector"),
            Self::Unknown => write!(f, "unrecognized"),
        }
    }
}

/// Details of a successful build
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    /// The produced image
    pub image: PathBuf,
    /// Image size in bytes
    pub image_size: u64,
    /// Payload location
    pub payload: PayloadStatus,
    /// Image signature
    pub signature: ImageSignature,
    /// Builder exit code, `None` when the image was reused
    pub exit_code: Option<i32>,
    /// Packages in the written manifest
    pub package_count: usize,
    /// Lines classified as fatal signals
    pub fatal_signals: Vec<String>,
    /// Non-fatal conditions
    pub warnings: Vec<BuildWarning>,
    /// The image is a recent earlier build, not validated against this configuration
    pub reused: bool,
}

/// Terminal state of one build attempt
#[derive(Debug)]
pub enum BuildOutcome {
    /// The image passed verification
    Succeeded(Box<BuildReport>),
    /// A stage failed
    Failed(PipelineError),
    /// The operator stopped the build
    Cancelled,
}

impl BuildOutcome {
    /// Whether the attempt produced a usable image
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }
}

/// Format a byte count in GiB with two decimals, or MiB below 1 GiB
pub fn format_size(bytes: u64) -> String {
    const MIB: f64 = 1024.0 * 1024.0;
    const GIB: f64 = MIB * 1024.0;
    #[allow(clippy::cast_precision_loss)]
    let bytes = bytes as f64;
    if bytes >= GIB {
        format!("{:.2} GB", bytes / GIB)
    } else {
        format!("{:.1} MB", bytes / MIB)
    }
}
