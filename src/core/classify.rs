//! Package classification
//!
//! Splits the explicitly installed packages of the host into those that
//! resolve against the configured sync repositories and those that do not
//! (AUR builds, locally built packages, packages from removed repositories).
//!
//! Queries run one package at a time: pacman holds a database lock and
//! concurrent `-Si` calls gain nothing.

use std::collections::HashSet;

use serde::Serialize;

use crate::config::defaults::DISTRO_PACKAGE_PREFIXES;
use crate::infra::pacman::Pacman;

/// Where a package can be installed from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PackageOrigin {
    /// Resolvable from the sync repositories
    Repository,
    /// Not resolvable; must be staged from the package cache
    NonRepository,
}

/// A classified package
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageRecord {
    /// Package name
    pub name: String,
    /// Package origin
    pub origin: PackageOrigin,
}

/// Classified package inventory of the host
#[derive(Debug, Clone, Default, Serialize)]
pub struct Inventory {
    /// One record per unique package name, in query order
    pub records: Vec<PackageRecord>,
}

impl Inventory {
    /// Names of repository-backed packages
    pub fn repository(&self) -> Vec<String> {
        self.names_with(PackageOrigin::Repository)
    }

    /// Names of non-repository packages
    pub fn non_repository(&self) -> Vec<String> {
        self.names_with(PackageOrigin::NonRepository)
    }

    /// All package names
    pub fn names(&self) -> Vec<String> {
        self.records.iter().map(|r| r.name.clone()).collect()
    }

    /// Whether the inventory contains a package
    pub fn contains(&self, name: &str) -> bool {
        self.records.iter().any(|r| r.name == name)
    }

    /// Records ordered for display: non-repository first, then by name
    pub fn sorted_for_display(&self) -> Vec<&PackageRecord> {
        let mut records: Vec<&PackageRecord> = self.records.iter().collect();
        records.sort_by(|a, b| {
            (a.origin == PackageOrigin::Repository, a.name.to_lowercase())
                .cmp(&(b.origin == PackageOrigin::Repository, b.name.to_lowercase()))
        });
        records
    }

    fn names_with(&self, origin: PackageOrigin) -> Vec<String> {
        self.records
            .iter()
            .filter(|r| r.origin == origin)
            .map(|r| r.name.clone())
            .collect()
    }
}

/// Classify package names against the sync repositories
///
/// Blank and duplicate names are skipped. A failed query classifies the
/// package as [`PackageOrigin::NonRepository`] so it is never dropped
/// silently. `on_progress` receives `(checked, total)` after every query.
pub fn classify<F>(pacman: &Pacman<'_>, names: &[String], mut on_progress: F) -> Inventory
where
    F: FnMut(usize, usize),
{
    let mut seen = HashSet::new();
    let unique: Vec<&str> = names
        .iter()
        .map(|n| n.trim())
        .filter(|n| !n.is_empty() && seen.insert(*n))
        .collect();

    let total = unique.len();
    let mut records = Vec::with_capacity(total);

    for (idx, name) in unique.into_iter().enumerate() {
        let origin = if pacman.in_sync_repositories(name) {
            PackageOrigin::Repository
        } else {
            PackageOrigin::NonRepository
        };
        tracing::debug!("{name}: {origin:?}");
        records.push(PackageRecord {
            name: name.to_string(),
            origin,
        });
        on_progress(idx + 1, total);
    }

    Inventory { records }
}

/// Non-repository packages dropped in official-only mode
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OfficialOnlySkips {
    /// Packages from other distributions' repositories
    pub distro_specific: Vec<String>,
    /// Everything else (AUR, local builds)
    pub aur: Vec<String>,
}

/// Split non-repository packages for official-only mode reporting
pub fn split_official_only(inventory: &Inventory) -> OfficialOnlySkips {
    let mut skips = OfficialOnlySkips::default();
    for name in inventory.non_repository() {
        if DISTRO_PACKAGE_PREFIXES
            .iter()
            .any(|prefix| name.contains(prefix))
        {
            skips.distro_specific.push(name);
        } else {
            skips.aur.push(name);
        }
    }
    skips
}
