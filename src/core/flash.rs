//! Writing images to removable media
//!
//! Copies a finished image onto a block device with `dd` after forcibly
//! unmounting the device's partitions. Progress follows dd's status output.

use anyhow::{bail, Result};
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::core::devices;
use crate::core::events::Reporter;
use crate::core::progress::ProgressTracker;
use crate::core::report::format_size;
use crate::error::WriteError;
use crate::infra::process::{self, stream_lines, CommandRunner, StreamExit};

/// Progress once the write has started
const STARTED: u8 = 10;
/// Progress once partitions are unmounted
const UNMOUNTED: u8 = 20;
/// Progress on dd's block counters
const RECORDS: u8 = 60;
/// Progress on dd's byte summary
const COPIED: u8 = 80;

/// Write options from CLI
#[derive(Debug, Clone)]
pub struct WriteOptions {
    /// Image to write
    pub image: PathBuf,
    /// Target block device
    pub device: PathBuf,
    /// Skip confirmation prompt
    pub yes: bool,
}

/// Result of a completed write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteResult {
    /// Image written
    pub image: PathBuf,
    /// Device written to
    pub device: PathBuf,
    /// Image size in bytes
    pub bytes: u64,
    /// Partitions that were unmounted first
    pub unmounted: Vec<PathBuf>,
}

/// Milestone for a line of dd output
pub fn dd_milestone(line: &str) -> Option<u8> {
    let lower = line.to_lowercase();
    if lower.contains("records in") || lower.contains("records out") {
        Some(RECORDS)
    } else if lower.contains("copied") {
        Some(COPIED)
    } else {
        None
    }
}

/// dd arguments for writing `image` to `device`
pub fn dd_args(image: &Path, device: &Path) -> Vec<String> {
    vec![
        format!("if={}", image.display()),
        format!("of={}", device.display()),
        "bs=4M".to_string(),
        "status=progress".to_string(),
        "oflag=sync".to_string(),
    ]
}

/// Media writer
pub struct MediaWriter {
    runner: Arc<dyn CommandRunner>,
    reporter: Reporter,
    cancel: CancellationToken,
    dd: String,
    require_root: bool,
}

impl MediaWriter {
    /// Create a writer running short commands through `runner`
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            reporter: Reporter::silent(),
            cancel: CancellationToken::new(),
            dd: "dd".to_string(),
            require_root: true,
        }
    }

    /// Deliver log lines and progress through `reporter`
    #[must_use]
    pub fn with_reporter(mut self, reporter: Reporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// Stop the write once `cancel` fires
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Use a different copy program with dd's argument syntax
    #[must_use]
    pub fn with_copy_program(mut self, program: impl Into<String>, require_root: bool) -> Self {
        self.dd = program.into();
        self.require_root = require_root;
        self
    }

    /// Check that the write can start
    pub fn preflight(&self, image: &Path, device: &Path) -> Result<(), WriteError> {
        if self.require_root && !process::running_as_root() {
            return Err(WriteError::NotRoot);
        }
        if !image.is_file() {
            return Err(WriteError::ImageNotFound {
                path: image.to_path_buf(),
            });
        }
        if !device.exists() {
            return Err(WriteError::DeviceNotFound {
                path: device.to_path_buf(),
            });
        }
        Ok(())
    }

    /// Write `image` to `device`
    ///
    /// Confirmation is the caller's job; see [`require_confirmation`].
    pub async fn write(&self, image: &Path, device: &Path) -> Result<WriteResult, WriteError> {
        self.preflight(image, device)?;
        let mut tracker = ProgressTracker::new();
        let bytes = image.metadata().map(|m| m.len()).unwrap_or(0);

        self.reporter.info(format!(
            "Writing {} ({}) to {}",
            image.display(),
            format_size(bytes),
            device.display()
        ));
        self.advance(&mut tracker, STARTED);

        let unmounted = self.unmount(device);
        self.advance(&mut tracker, UNMOUNTED);
        if self.cancel.is_cancelled() {
            return Err(WriteError::Cancelled);
        }

        let args = dd_args(image, device);
        let exit = stream_lines(&self.dd, &args, &self.cancel, |line| {
            self.reporter.output(line);
            if let Some(percent) = dd_milestone(line) {
                self.advance(&mut tracker, percent);
            }
        })
        .await?;

        match exit {
            StreamExit::Cancelled => {
                self.reporter.warn("Write cancelled; the device contents are incomplete");
                Err(WriteError::Cancelled)
            }
            StreamExit::Exited(Some(0)) => {
                self.advance(&mut tracker, 100);
                self.reporter.info(format!("Image written to {}", device.display()));
                Ok(WriteResult {
                    image: image.to_path_buf(),
                    device: device.to_path_buf(),
                    bytes,
                    unmounted,
                })
            }
            StreamExit::Exited(code) => {
                self.reporter.error(format!("Write process exited with code {code:?}"));
                Err(WriteError::Failed { code })
            }
        }
    }

    fn advance(&self, tracker: &mut ProgressTracker, percent: u8) {
        if let Some(percent) = tracker.advance(percent) {
            self.reporter.progress(percent);
        }
    }

    /// Force-unmount every mounted partition of `device`
    ///
    /// Failures are reported and ignored; dd fails later if the device is
    /// still busy.
    fn unmount(&self, device: &Path) -> Vec<PathBuf> {
        let mut unmounted = Vec::new();
        for partition in devices::mounted_partitions(self.runner.as_ref(), device) {
            let target = partition.to_string_lossy().into_owned();
            match self.runner.run("umount", &["-f", &target]) {
                Ok(output) if output.success() => {
                    self.reporter.info(format!("Unmounted {target}"));
                    unmounted.push(partition);
                }
                Ok(output) => self.reporter.warn(format!(
                    "Could not unmount {target}: {}",
                    output.stderr.trim()
                )),
                Err(e) => self.reporter.warn(format!("Could not unmount {target}: {e}")),
            }
        }
        unmounted
    }
}

/// Require operator confirmation before overwriting a device
pub fn require_confirmation(image: &Path, device: &Path) -> Result<()> {
    eprintln!();
    eprintln!("⚠️  WARNING: This will erase all data on {}!", device.display());
    eprintln!("   Image: {}", image.display());
    eprintln!();
    eprint!("   Are you sure you want to continue? [y/N] ");
    io::stderr().flush()?;

    // In non-interactive mode (no TTY), fail
    if !io::stdin().is_terminal() {
        bail!(
            "Cannot prompt for confirmation in non-interactive mode.\n\
             Use --yes to skip confirmation."
        );
    }

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    let input = input.trim().to_lowercase();
    if input != "y" && input != "yes" {
        bail!("Write cancelled by user.");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::events::BuildEvent;
    use crate::infra::process::{CommandOutput, ScriptedRunner};
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn fake_dd(dir: &Path, body: &str) -> String {
        let path = dir.join("fake-dd");
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn progress(rx: &mut tokio::sync::mpsc::UnboundedReceiver<BuildEvent>) -> Vec<u8> {
        let mut values = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let BuildEvent::Progress { percent } = event {
                values.push(percent);
            }
        }
        values
    }

    #[test]
    fn test_dd_args() {
        let args = dd_args(Path::new("/out/a.iso"), Path::new("/dev/sdb"));
        assert_eq!(
            args,
            vec!["if=/out/a.iso", "of=/dev/sdb", "bs=4M", "status=progress", "oflag=sync"]
        );
    }

    #[test]
    fn test_dd_milestone() {
        assert_eq!(dd_milestone("1024+0 records in"), Some(60));
        assert_eq!(dd_milestone("1024+0 records out"), Some(60));
        assert_eq!(
            dd_milestone("4294967296 bytes (4.3 GB, 4.0 GiB) copied, 120 s, 35.8 MB/s"),
            Some(80)
        );
        assert_eq!(dd_milestone("12345 bytes transferred"), None);
    }

    #[tokio::test]
    async fn test_write_unmounts_and_reports_progress() {
        let temp = TempDir::new().unwrap();
        let image = temp.path().join("a.iso");
        let device = temp.path().join("sdx");
        fs::write(&image, "image").unwrap();
        fs::write(&device, "").unwrap();
        let lsblk = format!("lsblk -ln -o NAME,MOUNTPOINT {}", device.display());
        let runner = Arc::new(
            ScriptedRunner::new().respond(&lsblk, CommandOutput::ok("sdx\nsdx1 /run/media/usb\nsdx2\n")),
        );
        let dd = fake_dd(
            temp.path(),
            "printf '100 bytes copied, 1 s\\r'\necho '1+0 records in'\necho '1+0 records out'\nexit 0",
        );
        let (reporter, mut rx) = Reporter::channel();

        let writer = MediaWriter::new(runner.clone())
            .with_reporter(reporter)
            .with_copy_program(dd, false);
        let result = writer.write(&image, &device).await.unwrap();

        assert_eq!(result.bytes, 5);
        assert_eq!(result.unmounted, vec![PathBuf::from("/dev/sdx1")]);
        assert!(runner.calls().contains(&"umount -f /dev/sdx1".to_string()));
        assert_eq!(progress(&mut rx), vec![10, 20, 80, 100]);
    }

    #[tokio::test]
    async fn test_write_failure_reports_code() {
        let temp = TempDir::new().unwrap();
        let image = temp.path().join("a.iso");
        let device = temp.path().join("sdx");
        fs::write(&image, "image").unwrap();
        fs::write(&device, "").unwrap();
        let dd = fake_dd(temp.path(), "echo 'dd: error writing: No space left on device' >&2\nexit 1");

        let writer = MediaWriter::new(Arc::new(ScriptedRunner::new())).with_copy_program(dd, false);
        let err = writer.write(&image, &device).await.unwrap_err();

        assert!(matches!(err, WriteError::Failed { code: Some(1) }));
    }

    #[tokio::test]
    async fn test_preflight_checks_paths() {
        let temp = TempDir::new().unwrap();
        let image = temp.path().join("a.iso");
        let writer = MediaWriter::new(Arc::new(ScriptedRunner::new())).with_copy_program("dd", false);

        let err = writer.write(&image, Path::new("/dev/null")).await.unwrap_err();
        assert!(matches!(err, WriteError::ImageNotFound { .. }));

        fs::write(&image, "x").unwrap();
        let err = writer
            .write(&image, &temp.path().join("no-such-device"))
            .await
            .unwrap_err();
        assert!(matches!(err, WriteError::DeviceNotFound { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_before_copy() {
        let temp = TempDir::new().unwrap();
        let image = temp.path().join("a.iso");
        fs::write(&image, "x").unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let writer = MediaWriter::new(Arc::new(ScriptedRunner::new()))
            .with_cancellation(cancel)
            .with_copy_program("dd", false);
        let err = writer.write(&image, Path::new("/dev/null")).await.unwrap_err();

        assert!(matches!(err, WriteError::Cancelled));
    }
}
