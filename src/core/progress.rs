//! Build progress inference
//!
//! The image builder prints unstructured text. Progress is inferred from it
//! with an ordered pattern table and a tracker that never moves backwards.
//! Each line is also classified as informational, a known-harmless error,
//! or a fatal signal.

use serde::Serialize;

/// Discrete progress milestones of a build
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Milestone {
    /// Work and output directories prepared
    Started,
    /// Image builder package present
    ToolingVerified,
    /// Base profile staged
    ProfileCopied,
    /// Package list written
    ManifestWritten,
    /// Root filesystem customized, packages installing
    PackagesInstalling,
    /// Root filesystem being built
    RootfsBuilding,
    /// squashfs payload being created
    SquashfsCreating,
    /// Image being assembled
    ImageCreating,
    /// Builder exited
    Done,
}

impl Milestone {
    /// Percentage reached at this milestone
    pub fn percent(self) -> u8 {
        match self {
            Self::Started => 10,
            Self::ToolingVerified => 20,
            Self::ProfileCopied => 30,
            Self::ManifestWritten => 40,
            Self::PackagesInstalling => 50,
            Self::RootfsBuilding => 60,
            Self::SquashfsCreating => 80,
            Self::ImageCreating => 90,
            Self::Done => 100,
        }
    }
}

/// Builder output patterns, first match wins
///
/// Every substring of a row must occur in the lower-cased line.
pub const MILESTONE_TABLE: &[(&[&str], Milestone)] = &[
    (&["squashfs", "creating"], Milestone::SquashfsCreating),
    (&["squashfs", "created"], Milestone::SquashfsCreating),
    (&["iso", "creating"], Milestone::ImageCreating),
    (&["packages", "installing"], Milestone::PackagesInstalling),
    (&["building", "airootfs"], Milestone::RootfsBuilding),
];

/// Keywords that mark a line as an error
pub const ERROR_KEYWORDS: &[&str] = &["error:", "failed", "fatal:", "cannot", "unable"];

/// Error lines the image builder prints on healthy builds
pub const BENIGN_ERRORS: &[&str] = &[
    "/boot/grub/grub.cfg.new: no such file or directory",
    "running in chroot",
    "skipped: running in chroot",
    "errors were encountered during the build. the image may not be complete",
];

/// Milestone a builder output line points at, if any
pub fn milestone_for(line: &str) -> Option<Milestone> {
    let lower = line.to_lowercase();
    MILESTONE_TABLE
        .iter()
        .find(|(needles, _)| needles.iter().all(|n| lower.contains(n)))
        .map(|(_, milestone)| *milestone)
}

/// Classification of one builder output line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineClass {
    /// Ordinary output
    Info,
    /// Matches a known-harmless error
    Benign,
    /// Looks like a real error
    Fatal,
}

/// Classify a builder output line
pub fn classify_line(line: &str) -> LineClass {
    let lower = line.to_lowercase();
    if BENIGN_ERRORS.iter().any(|p| lower.contains(p)) {
        return LineClass::Benign;
    }
    if lower.contains("warning") || !ERROR_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return LineClass::Info;
    }
    LineClass::Fatal
}

/// Monotonic progress value in `0..=100`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressTracker {
    current: u8,
}

impl ProgressTracker {
    /// Tracker at 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value
    pub fn current(&self) -> u8 {
        self.current
    }

    /// Move to `percent` unless that would go backwards
    ///
    /// Returns the new value when it changed.
    pub fn advance(&mut self, percent: u8) -> Option<u8> {
        let percent = percent.min(100);
        if percent > self.current {
            self.current = percent;
            Some(percent)
        } else {
            None
        }
    }

    /// Advance to a milestone
    pub fn reach(&mut self, milestone: Milestone) -> Option<u8> {
        self.advance(milestone.percent())
    }

    /// Advance according to a builder output line
    pub fn observe(&mut self, line: &str) -> Option<u8> {
        milestone_for(line).and_then(|m| self.reach(m))
    }
}
