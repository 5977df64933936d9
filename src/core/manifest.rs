//! Package manifest construction
//!
//! Merges the base profile's `packages.x86_64` with the packages selected
//! from the host, the operator's exclusions and the required package set,
//! then writes the result back into the staged profile.
//!
//! Ordering rules:
//! 1. Base profile lines first, in their original order, comments and blank
//!    lines kept verbatim, excluded packages removed.
//! 2. A `# Added from current system` separator.
//! 3. Required packages missing from everything above, sorted.
//! 4. Host packages not already in the base list, sorted.
//!
//! The file written to disk is authoritative: the returned package list is
//! re-read from it rather than taken from memory.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use crate::config::defaults::REQUIRED_PACKAGES;
use crate::config::paths::PACKAGES_FILE;
use crate::error::{FilesystemError, PipelineError};
use crate::infra::filesystem;

/// Separator comment written before appended packages
pub const ADDED_SEPARATOR: &str = "# Added from current system";

/// Result of writing a manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestReport {
    /// Path of the written package list
    pub path: PathBuf,
    /// Package names as re-read from the written file
    pub packages: Vec<String>,
    /// Number of packages in the written file
    pub count: usize,
    /// Required set the manifest was built against
    pub required: BTreeSet<String>,
    /// Exclusions that named required packages and were ignored
    pub ignored_exclusions: Vec<String>,
    /// Required packages appended because nothing else provided them
    pub required_added: Vec<String>,
    /// Host packages appended after the base list
    pub custom_additions: Vec<String>,
}

impl ManifestReport {
    /// Required packages absent from the written file
    pub fn missing_required(&self) -> Vec<String> {
        let present: HashSet<&str> = self.packages.iter().map(String::as_str).collect();
        self.required
            .iter()
            .filter(|p| !present.contains(p.as_str()))
            .cloned()
            .collect()
    }
}

/// The fixed set of packages every image must contain
pub fn required_set() -> BTreeSet<String> {
    REQUIRED_PACKAGES.iter().map(|s| (*s).to_string()).collect()
}

/// Split exclusions into those that apply and those naming required packages
///
/// Returns `(effective, ignored)` where `effective = exclusions − required`
/// and `ignored = exclusions ∩ required` (sorted).
pub fn split_exclusions(
    exclusions: &[String],
    required: &BTreeSet<String>,
) -> (BTreeSet<String>, Vec<String>) {
    let mut effective = BTreeSet::new();
    let mut ignored = BTreeSet::new();
    for name in exclusions.iter().map(|e| e.trim()).filter(|e| !e.is_empty()) {
        if required.contains(name) {
            ignored.insert(name.to_string());
        } else {
            effective.insert(name.to_string());
        }
    }
    (effective, ignored.into_iter().collect())
}

/// Build the manifest in `profile_dir` against the standard required set
pub fn build_manifest(
    profile_dir: &Path,
    candidates: &[String],
    exclusions: &[String],
) -> Result<ManifestReport, PipelineError> {
    build_manifest_with(profile_dir, candidates, exclusions, &required_set())
}

/// Build the manifest in `profile_dir` against an explicit required set
pub fn build_manifest_with(
    profile_dir: &Path,
    candidates: &[String],
    exclusions: &[String],
    required: &BTreeSet<String>,
) -> Result<ManifestReport, PipelineError> {
    let path = profile_dir.join(PACKAGES_FILE);
    if !path.is_file() {
        return Err(PipelineError::MissingBaseProfile { path });
    }

    let base = filesystem::read_file(&path)?;
    let (effective, ignored_exclusions) = split_exclusions(exclusions, required);
    if !ignored_exclusions.is_empty() {
        tracing::warn!(
            "Ignoring exclusions for required packages: {}",
            ignored_exclusions.join(", ")
        );
    }

    let mut base_lines = Vec::new();
    let mut base_packages: HashSet<String> = HashSet::new();
    for line in base.lines() {
        let token = line.trim();
        if is_package_line(token) {
            if effective.contains(token) || !base_packages.insert(token.to_string()) {
                continue;
            }
        }
        base_lines.push(line);
    }

    let custom_additions: Vec<String> = candidates
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty() && !effective.contains(*c) && !base_packages.contains(*c))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(String::from)
        .collect();

    let required_added: Vec<String> = required
        .iter()
        .filter(|r| !base_packages.contains(r.as_str()) && !custom_additions.contains(r))
        .cloned()
        .collect();
    if !required_added.is_empty() {
        tracing::info!(
            "Adding required packages missing from base list: {}",
            required_added.join(", ")
        );
    }

    let content = render(&base_lines, &required_added, &custom_additions);
    filesystem::write_file(&path, &content)?;

    let packages = read_package_list(&path)?;
    Ok(ManifestReport {
        path,
        count: packages.len(),
        packages,
        required: required.clone(),
        ignored_exclusions,
        required_added,
        custom_additions,
    })
}

fn render(base_lines: &[&str], required_added: &[String], custom_additions: &[String]) -> String {
    let mut content = String::new();
    if !base_lines.is_empty() {
        content.push_str(base_lines.join("\n").trim_end());
        content.push('\n');
    }
    if !required_added.is_empty() || !custom_additions.is_empty() {
        content.push('\n');
        content.push_str(ADDED_SEPARATOR);
        content.push('\n');
        for name in required_added.iter().chain(custom_additions) {
            content.push_str(name);
            content.push('\n');
        }
    }
    content
}

fn is_package_line(trimmed: &str) -> bool {
    !trimmed.is_empty() && !trimmed.starts_with('#')
}

/// Read the package names from a package list file
pub fn read_package_list(path: &Path) -> Result<Vec<String>, FilesystemError> {
    Ok(filesystem::read_file(path)?
        .lines()
        .map(str::trim)
        .filter(|line| is_package_line(line))
        .map(String::from)
        .collect())
}
