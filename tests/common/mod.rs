//! Common test utilities and helpers
//!
//! This module provides shared utilities for integration tests.

#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use isoforge::core::build_config::BuildConfig;
use isoforge::core::global_config::ForgeConfig;
use isoforge::infra::dirs::ForgeDirs;
use tempfile::TempDir;

/// Base package list of the sample profile
pub const SAMPLE_PACKAGES: &str = "\
# Base system
base
linux
linux-firmware

# Boot
mkinitcpio
mkinitcpio-archiso
squashfs-tools
syslinux
";

/// Sample `profiledef.sh`
pub const SAMPLE_PROFILEDEF: &str = r#"#!/usr/bin/env bash
iso_name="archlinux"
iso_label="ARCH_202405"
iso_publisher="Arch Linux <https://archlinux.org>"
iso_application="Arch Linux Live/Rescue DVD"
iso_version="$(date --date="@${SOURCE_DATE_EPOCH:-$(date +%s)}" +%Y.%m.%d)"
install_dir="arch"
buildmodes=('iso')
pacman_conf="pacman.conf"
airootfs_image_type="squashfs"
"#;

/// Sample `pacman.conf`
pub const SAMPLE_PACMAN_CONF: &str = "\
[options]
Architecture = auto

[core]
Include = /etc/pacman.d/mirrorlist
";

/// Test project context
///
/// Creates a temporary directory holding a base profile, a package cache and
/// the work and output directories of a build.
pub struct TestProject {
    /// Temporary directory for the test project
    pub dir: TempDir,
}

impl TestProject {
    /// Create a new test project in a temporary directory
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Create a test project with a sample base profile under `releng/`
    pub fn with_profile() -> Self {
        let project = Self::new();
        project.create_file("releng/packages.x86_64", SAMPLE_PACKAGES);
        project.create_file("releng/profiledef.sh", SAMPLE_PROFILEDEF);
        project.create_file("releng/pacman.conf", SAMPLE_PACMAN_CONF);
        project.create_file("releng/airootfs/etc/motd", "Welcome\n");
        project.create_dir("cache");
        project
    }

    /// Get the path to the test project directory
    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Create a file in the test project
    pub fn create_file(&self, name: &str, content: &str) {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        std::fs::write(path, content).expect("Failed to write file");
    }

    /// Create a directory in the test project
    pub fn create_dir(&self, name: &str) {
        let path = self.dir.path().join(name);
        std::fs::create_dir_all(path).expect("Failed to create directory");
    }

    /// Check if a file exists in the test project
    pub fn file_exists(&self, name: &str) -> bool {
        self.dir.path().join(name).exists()
    }

    /// Read a file from the test project
    pub fn read_file(&self, name: &str) -> String {
        std::fs::read_to_string(self.dir.path().join(name)).expect("Failed to read file")
    }

    /// Write an executable `/bin/sh` script standing in for the image builder
    ///
    /// The builder is called as `-v -w <build> -o <output> <profile>`, so the
    /// script sees the build directory in `$3` and the output directory in `$5`.
    pub fn fake_builder(&self, body: &str) -> String {
        let path = self.dir.path().join("fake-mkarchiso");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("Failed to write builder");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .expect("Failed to make builder executable");
        path.to_string_lossy().into_owned()
    }

    /// Build configuration pointing every host path into the project
    pub fn build_config(&self, builder: String) -> BuildConfig {
        let root = self.path();
        let mut config = BuildConfig::from_config(&ForgeConfig::default(), &ForgeDirs::new());
        config.work_dir = root.join("work");
        config.output_dir = root.join("out/iso");
        config.builder = builder;
        config.host.profile_source = root.join("releng");
        config.host.package_cache = root.join("cache");
        config.host.pacman_conf = root.join("host-pacman.conf");
        config.host.network_manager = root.join("host-nm");
        config.host.passwd = root.join("passwd");
        config.host.home_base = root.join("home");
        config
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder body producing an ISO 9660 image and a squashfs payload
pub const BUILDER_OK: &str = r#"
echo "[mkarchiso] INFO: Installing packages to airootfs"
echo "[mkarchiso] INFO: Creating SquashFS image, this may take some time..."
mkdir -p "$3/x86_64/airootfs" "$5"
head -c 1048576 /dev/zero > "$3/x86_64/airootfs.sfs"
head -c 32769 /dev/zero > "$5/custom-arch-x86_64.iso"
printf 'CD001' >> "$5/custom-arch-x86_64.iso"
echo "[mkarchiso] INFO: Done!"
"#;
