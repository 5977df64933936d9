//! Image builder execution
//!
//! Runs the external image builder, relays its output, records fatal-looking
//! lines and advances progress from recognized log patterns. Fatal signals
//! never stop the builder; the verifier decides the outcome afterwards.

use tokio_util::sync::CancellationToken;

use crate::core::build_config::BuildConfig;
use crate::core::events::Reporter;
use crate::core::progress::{classify_line, LineClass, Milestone, ProgressTracker};
use crate::error::PipelineError;
use crate::infra::process::{stream_lines, StreamExit};

/// Prefix marking relayed fatal signals
pub const ERROR_PREFIX: &str = "[ERROR DETECTED]";

/// Finished builder run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverResult {
    /// Exit code, `None` when killed by a signal
    pub exit_code: Option<i32>,
    /// Output lines classified as fatal
    pub fatal_signals: Vec<String>,
}

/// How the builder run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverOutcome {
    /// The builder exited on its own
    Exited(DriverResult),
    /// The operator stopped the build; the builder was killed
    Cancelled,
}

/// Builder command-line arguments: `-v -w <work>/build -o <output> <profile>`
pub fn builder_args(config: &BuildConfig) -> Vec<String> {
    vec![
        "-v".to_string(),
        "-w".to_string(),
        config.build_dir().to_string_lossy().into_owned(),
        "-o".to_string(),
        config.output_dir.to_string_lossy().into_owned(),
        config.profile_dir().to_string_lossy().into_owned(),
    ]
}

/// Run the image builder to completion or cancellation
pub async fn run_builder(
    config: &BuildConfig,
    tracker: &mut ProgressTracker,
    reporter: &Reporter,
    cancel: &CancellationToken,
) -> Result<DriverOutcome, PipelineError> {
    let args = builder_args(config);
    reporter.info(format!("Running {} {}", config.builder, args.join(" ")));

    let mut fatal_signals = Vec::new();
    let exit = stream_lines(&config.builder, &args, cancel, |line| {
        reporter.output(line);
        if classify_line(line) == LineClass::Fatal {
            reporter.error(format!("{ERROR_PREFIX} {line}"));
            fatal_signals.push(line.to_string());
        }
        if let Some(percent) = tracker.observe(line) {
            reporter.progress(percent);
        }
    })
    .await?;

    match exit {
        StreamExit::Cancelled => Ok(DriverOutcome::Cancelled),
        StreamExit::Exited(exit_code) => {
            if let Some(percent) = tracker.reach(Milestone::Done) {
                reporter.progress(percent);
            }
            if exit_code == Some(0) {
                reporter.info("Image builder finished");
            } else {
                reporter.warn(format!("Image builder exited with code {exit_code:?}"));
            }
            Ok(DriverOutcome::Exited(DriverResult {
                exit_code,
                fatal_signals,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::events::{BuildEvent, LogLevel};
    use crate::core::global_config::ForgeConfig;
    use crate::infra::dirs::ForgeDirs;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use tempfile::TempDir;

    fn fake_builder(dir: &Path, body: &str) -> String {
        let path = dir.join("fake-mkarchiso");
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn config(temp: &TempDir, builder: String) -> BuildConfig {
        let mut config = BuildConfig::from_config(&ForgeConfig::default(), &ForgeDirs::new());
        config.work_dir = temp.path().join("work");
        config.output_dir = temp.path().join("out");
        config.builder = builder;
        config
    }

    #[test]
    fn test_builder_args() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp, "mkarchiso".to_string());

        let args = builder_args(&config);

        assert_eq!(args[0], "-v");
        assert_eq!(args[2], temp.path().join("work/build").to_string_lossy());
        assert_eq!(args[4], temp.path().join("out").to_string_lossy());
        assert_eq!(args[5], temp.path().join("work/profile").to_string_lossy());
    }

    #[tokio::test]
    async fn test_run_builder_tracks_progress_and_signals() {
        let temp = TempDir::new().unwrap();
        let builder = fake_builder(
            temp.path(),
            "echo 'Installing packages'\necho 'error: failed to mount' >&2\necho 'Running in chroot, ignoring request'\necho 'Creating ISO image'\necho 'Installing packages again'\nexit 0",
        );
        let config = config(&temp, builder);
        let (reporter, mut rx) = Reporter::channel();
        let mut tracker = ProgressTracker::new();
        tracker.reach(Milestone::ProfileCopied);

        let outcome = run_builder(&config, &mut tracker, &reporter, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            outcome,
            DriverOutcome::Exited(DriverResult {
                exit_code: Some(0),
                fatal_signals: vec!["error: failed to mount".to_string()],
            })
        );
        drop(reporter);
        let mut progress = Vec::new();
        let mut flagged = Vec::new();
        while let Some(event) = rx.recv().await {
            match event {
                BuildEvent::Progress { percent } => progress.push(percent),
                BuildEvent::Log { level: LogLevel::Error, message } => flagged.push(message),
                BuildEvent::Log { .. } => {}
            }
        }
        assert_eq!(progress, vec![50, 90, 100]);
        assert_eq!(flagged, vec!["[ERROR DETECTED] error: failed to mount"]);
    }

    #[tokio::test]
    async fn test_run_builder_reports_exit_code() {
        let temp = TempDir::new().unwrap();
        let builder = fake_builder(temp.path(), "exit 4");
        let config = config(&temp, builder);

        let outcome = run_builder(
            &config,
            &mut ProgressTracker::new(),
            &Reporter::silent(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(matches!(
            outcome,
            DriverOutcome::Exited(DriverResult { exit_code: Some(4), .. })
        ));
    }

    #[tokio::test]
    async fn test_run_builder_cancelled() {
        let temp = TempDir::new().unwrap();
        let builder = fake_builder(temp.path(), "echo 'Building airootfs'\nsleep 30");
        let config = config(&temp, builder);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let (reporter, mut rx) = Reporter::channel();

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if event == (BuildEvent::Progress { percent: 60 }) {
                    trigger.cancel();
                }
            }
        });

        let mut tracker = ProgressTracker::new();
        let outcome = run_builder(&config, &mut tracker, &reporter, &cancel).await.unwrap();

        assert_eq!(outcome, DriverOutcome::Cancelled);
        assert_eq!(tracker.current(), 60);
    }
}
