//! Integration tests for package manifest construction
//!
//! Covers the merge of the base package list with host packages, the
//! operator's exclusions and the required package set.

mod common;

use std::collections::{BTreeSet, HashSet};

use common::TestProject;
use isoforge::core::manifest::{build_manifest, build_manifest_with, required_set, ADDED_SEPARATOR};
use proptest::prelude::*;

fn strings(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| (*s).to_string()).collect()
}

fn project_with_base(base: &str) -> TestProject {
    let project = TestProject::new();
    project.create_file("profile/packages.x86_64", base);
    project
}

#[test]
fn test_excluded_candidate_dropped_and_required_appended() {
    let project = project_with_base("a\nb\nc\n");
    let required: BTreeSet<String> = strings(&["base"]).into_iter().collect();

    let report = build_manifest_with(
        &project.path().join("profile"),
        &strings(&["b", "d"]),
        &strings(&["d"]),
        &required,
    )
    .unwrap();

    assert_eq!(report.packages, strings(&["a", "b", "c", "base"]));
    assert_eq!(report.required_added, strings(&["base"]));
    assert!(report.custom_additions.is_empty());
    assert_eq!(
        project.read_file("profile/packages.x86_64"),
        format!("a\nb\nc\n\n{ADDED_SEPARATOR}\nbase\n")
    );
}

#[test]
fn test_required_exclusion_ignored() {
    let project = project_with_base("base\nlinux\nvim\n");

    let report = build_manifest(
        &project.path().join("profile"),
        &[],
        &strings(&["base", "vim"]),
    )
    .unwrap();

    assert!(report.packages.contains(&"base".to_string()));
    assert!(!report.packages.contains(&"vim".to_string()));
    assert_eq!(report.ignored_exclusions, strings(&["base"]));
    assert!(report.missing_required().is_empty());
}

#[test]
fn test_stock_required_set_always_present() {
    let project = project_with_base("# empty profile\n");

    let report = build_manifest(&project.path().join("profile"), &strings(&["git"]), &[]).unwrap();

    for package in required_set() {
        assert!(report.packages.contains(&package), "{package} missing");
    }
    assert_eq!(report.count, required_set().len() + 1);
}

#[test]
fn test_comments_and_blank_lines_kept() {
    let base = "# Core\nbase\n\n# Tools\n# vim\nnano\n";
    let project = project_with_base(base);
    let required: BTreeSet<String> = strings(&["base"]).into_iter().collect();

    build_manifest_with(&project.path().join("profile"), &[], &[], &required).unwrap();

    assert_eq!(project.read_file("profile/packages.x86_64"), base);
}

// ============================================
// Property-Based Tests
// ============================================

/// Strategy for generating package names
fn package_name_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,8}"
}

fn package_set_strategy(max: usize) -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(package_name_strategy(), 0..max)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// The manifest holds every required package, no effective exclusion,
    /// every non-excluded candidate, and no name twice
    #[test]
    fn prop_manifest_set_rules(
        base in package_set_strategy(12),
        candidates in package_set_strategy(12),
        exclusions in package_set_strategy(6),
        required in package_set_strategy(4),
    ) {
        let project = project_with_base(&base.join("\n"));
        let required: BTreeSet<String> = required.into_iter().collect();

        let report = build_manifest_with(
            &project.path().join("profile"),
            &candidates,
            &exclusions,
            &required,
        ).unwrap();

        let listed: HashSet<&String> = report.packages.iter().collect();
        prop_assert_eq!(listed.len(), report.packages.len(), "duplicate entries");
        for package in &required {
            prop_assert!(listed.contains(package), "required {} missing", package);
        }
        for excluded in exclusions.iter().filter(|e| !required.contains(*e)) {
            prop_assert!(!listed.contains(excluded), "excluded {} present", excluded);
        }
        for candidate in candidates.iter().filter(|c| !exclusions.contains(c)) {
            prop_assert!(listed.contains(candidate), "candidate {} missing", candidate);
        }
        prop_assert!(report.missing_required().is_empty());
    }

    /// Rebuilding from the written manifest with the same inputs changes nothing
    #[test]
    fn prop_manifest_rebuild_is_stable(
        base in package_set_strategy(10),
        candidates in package_set_strategy(10),
        exclusions in package_set_strategy(5),
    ) {
        let project = project_with_base(&base.join("\n"));
        let profile = project.path().join("profile");
        let required: BTreeSet<String> = strings(&["base", "linux"]).into_iter().collect();

        build_manifest_with(&profile, &candidates, &exclusions, &required).unwrap();
        let first = project.read_file("profile/packages.x86_64");
        build_manifest_with(&profile, &candidates, &exclusions, &required).unwrap();
        let second = project.read_file("profile/packages.x86_64");

        prop_assert_eq!(first, second);
    }
}
