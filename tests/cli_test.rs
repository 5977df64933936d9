//! Integration tests for the isoforge command line
//!
//! Runs the compiled binary with its directories redirected into a
//! temporary project through the `ISOFORGE_*` environment variables.

mod common;

use common::TestProject;
use std::process::Command;

/// Helper to run isoforge with directories inside the test project
fn run_isoforge(project: &TestProject, args: &[&str]) -> std::process::Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_isoforge"));
    cmd.current_dir(project.path());
    cmd.env("ISOFORGE_CONFIG_DIR", project.path().join("config"));
    cmd.env("ISOFORGE_WORK_DIR", project.path().join("work"));
    cmd.env("ISOFORGE_OUTPUT_DIR", project.path().join("out"));
    cmd.env_remove("RUST_LOG");
    for arg in args {
        cmd.arg(arg);
    }
    cmd.output().expect("Failed to execute isoforge")
}

#[test]
fn test_help_lists_commands() {
    let project = TestProject::new();
    let output = run_isoforge(&project, &["--help"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["build", "write", "packages", "devices", "users", "doctor", "clean", "config"] {
        assert!(stdout.contains(command), "help should list {command}: {stdout}");
    }
}

#[test]
fn test_help_describes_workflow() {
    let project = TestProject::new();

    let short = run_isoforge(&project, &["-h"]);
    assert!(short.status.success());
    let short = String::from_utf8_lossy(&short.stdout);
    assert!(short.contains("Build a bootable Arch Linux image from the running system"));
    assert!(!short.contains("mkarchiso"));

    let long = run_isoforge(&project, &["--help"]);
    assert!(long.status.success());
    let long = String::from_utf8_lossy(&long.stdout);
    assert!(long.contains("runs mkarchiso"), "long help should explain the build: {long}");
    assert!(long.contains("removable device"));
}

#[test]
fn test_version() {
    let project = TestProject::new();
    let output = run_isoforge(&project, &["--version"]);

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_build_help_shows_flags() {
    let project = TestProject::new();
    let output = run_isoforge(&project, &["build", "--help"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for flag in ["--exclude", "--copy-from-user", "--official-only", "--reuse-recent", "--device"] {
        assert!(stdout.contains(flag), "build help should list {flag}");
    }
}

#[test]
fn test_rust_log_overrides_verbosity() {
    let project = TestProject::new();
    let output = Command::new(env!("CARGO_BIN_EXE_isoforge"))
        .current_dir(project.path())
        .env("ISOFORGE_CONFIG_DIR", project.path().join("config"))
        .env("ISOFORGE_WORK_DIR", project.path().join("work"))
        .env("ISOFORGE_OUTPUT_DIR", project.path().join("out"))
        .env("RUST_LOG", "debug")
        .args(["--json", "config"])
        .output()
        .expect("Failed to execute isoforge");

    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("DEBUG"), "RUST_LOG=debug should enable debug logs: {stderr}");
}

#[test]
fn test_default_verbosity_hides_debug_logs() {
    let project = TestProject::new();
    let output = run_isoforge(&project, &["--json", "config"]);

    assert!(output.status.success());
    assert!(!String::from_utf8_lossy(&output.stderr).contains("DEBUG"));
}

#[test]
fn test_config_defaults_without_file() {
    let project = TestProject::new();
    let output = run_isoforge(&project, &["--json", "config"]);

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).expect("config output is JSON");
    assert_eq!(json["config_file_exists"], false);
    assert_eq!(json["effective"]["image_name"], "custom-arch");
    assert_eq!(json["effective"]["username"], "archuser");
    assert_eq!(
        json["effective"]["work_dir"],
        project.path().join("work").to_string_lossy().as_ref()
    );
}

#[test]
fn test_config_reads_file() {
    let project = TestProject::new();
    project.create_file(
        "config/config.toml",
        r#"
[image]
name = "my-arch"

[packages]
exclude = ["firefox", "steam"]

[user]
username = "live"
autologin = false
"#,
    );

    let output = run_isoforge(&project, &["--json", "config"]);

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["config_file_exists"], true);
    assert_eq!(json["effective"]["image_name"], "my-arch");
    assert_eq!(json["effective"]["username"], "live");
    assert_eq!(json["effective"]["autologin"], false);
    assert_eq!(json["effective"]["exclusions"], serde_json::json!(["firefox", "steam"]));
}

#[test]
fn test_config_rejects_unknown_keys() {
    let project = TestProject::new();
    project.create_file("config/config.toml", "[image]\nnmae = \"typo\"\n");

    let output = run_isoforge(&project, &["config"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("config.toml"), "error should name the file: {stderr}");
}

#[test]
fn test_clean_removes_work_and_output() {
    let project = TestProject::new();
    project.create_file("work/profile/packages.x86_64", "base\n");
    project.create_file("out/custom-arch.iso", "image");

    let output = run_isoforge(&project, &["clean"]);

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(!project.file_exists("work"));
    assert!(!project.file_exists("out"));
}

#[test]
fn test_clean_nothing_to_do() {
    let project = TestProject::new();

    let output = run_isoforge(&project, &["--json", "clean"]);

    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["removed"], serde_json::json!([]));
}

#[test]
fn test_write_missing_image_fails() {
    let project = TestProject::new();

    let output = run_isoforge(
        &project,
        &["write", "missing.iso", "--device", "/dev/isoforge-test-none", "--yes"],
    );

    assert!(!output.status.success());
}

#[test]
fn test_build_rejects_invalid_username() {
    let project = TestProject::new();

    let output = run_isoforge(&project, &["build", "--username", "Not Valid"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("user.username"), "{stderr}");
}
