//! Output formatting and progress indicators
//!
//! This module provides utilities for displaying progress bars,
//! status messages and JSON output, and renders build events.

use std::sync::OnceLock;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::core::events::{BuildEvent, LogLevel};

static OUTPUT: OnceLock<OutputConfig> = OnceLock::new();

/// Output settings from the global flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputConfig {
    /// Only errors are printed
    pub quiet: bool,
    /// Machine-readable output
    pub json: bool,
    /// Verbosity level
    pub verbose: u8,
}

impl OutputConfig {
    /// Create an output configuration
    pub fn new(quiet: bool, json: bool, verbose: u8) -> Self {
        Self { quiet, json, verbose }
    }

    /// Make this configuration visible to the output helpers
    ///
    /// Only the first call has an effect.
    pub fn apply_global(self) {
        let _ = OUTPUT.set(self);
    }

    /// The active configuration
    pub fn current() -> Self {
        OUTPUT.get().copied().unwrap_or_default()
    }
}

/// Whether JSON output was requested
pub fn is_json() -> bool {
    OutputConfig::current().json
}

/// Whether quiet mode is active
pub fn is_quiet() -> bool {
    OutputConfig::current().quiet
}

/// Whether human-readable progress output should be shown
fn is_interactive_output() -> bool {
    let config = OutputConfig::current();
    !config.quiet && !config.json
}

/// Print a success message
pub fn print_success(message: &str) {
    if is_interactive_output() {
        println!("{} {message}", status::SUCCESS);
    }
}

/// Print an informational message
pub fn print_info(message: &str) {
    if is_interactive_output() {
        println!("{} {message}", status::INFO);
    }
}

/// Print a warning
pub fn print_warning(message: &str) {
    if !is_json() {
        eprintln!("{} {message}", status::WARNING);
    }
}

/// Print an indented detail line
pub fn print_detail(message: &str) {
    if is_interactive_output() {
        println!("   {message}");
    }
}

/// Print a value as pretty JSON on stdout
pub fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => tracing::error!("Failed to serialize output: {}", e),
    }
}

/// Print an error and its causes
pub fn display_error(error: &anyhow::Error) {
    if is_json() {
        let causes: Vec<String> = error.chain().skip(1).map(ToString::to_string).collect();
        print_json(&serde_json::json!({
            "status": "error",
            "message": error.to_string(),
            "causes": causes,
        }));
        return;
    }

    eprintln!("{} Error: {error}", status::ERROR);
    for cause in error.chain().skip(1) {
        eprintln!("  Caused by: {cause}");
    }
}

/// Create a spinner for operations with unknown duration
pub fn create_spinner(message: &str) -> ProgressBar {
    if !is_interactive_output() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
            .template("{spinner:.blue} {msg}")
            .expect("Invalid spinner template"),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Create a percentage bar for builds and media writes
pub fn create_percent_bar(message: &str) -> ProgressBar {
    if !is_interactive_output() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .expect("Invalid progress bar template")
            .progress_chars("█▓▒░"),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

/// Longest tool output line shown as the bar message
const BAR_MESSAGE_WIDTH: usize = 60;

/// Render events until every sender is gone
pub async fn render_events(mut rx: UnboundedReceiver<BuildEvent>, bar: &ProgressBar) {
    let config = OutputConfig::current();

    while let Some(event) = rx.recv().await {
        if config.json {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::error!("Failed to serialize event: {}", e),
            }
            continue;
        }

        match event {
            BuildEvent::Progress { percent } => bar.set_position(u64::from(percent)),
            BuildEvent::Log { level, message } => match level {
                LogLevel::Error => bar.suspend(|| eprintln!("{} {message}", status::ERROR)),
                LogLevel::Warn if !config.quiet => {
                    bar.suspend(|| eprintln!("{} {message}", status::WARNING));
                }
                LogLevel::Info if !config.quiet => bar.println(format!("{} {message}", status::INFO)),
                LogLevel::Output if config.verbose > 0 && !config.quiet => bar.println(message),
                LogLevel::Output => bar.set_message(truncate(&message, BAR_MESSAGE_WIDTH)),
                LogLevel::Warn | LogLevel::Info => {}
            },
        }
    }
}

fn truncate(line: &str, width: usize) -> String {
    if line.chars().count() <= width {
        return line.to_string();
    }
    let mut short: String = line.chars().take(width.saturating_sub(1)).collect();
    short.push('…');
    short
}

/// Status message prefixes
pub mod status {
    /// Success prefix (green checkmark)
    pub const SUCCESS: &str = "✓";

    /// Error prefix (red X)
    pub const ERROR: &str = "✗";

    /// Warning prefix (yellow triangle)
    pub const WARNING: &str = "⚠";

    /// Info prefix (blue circle)
    pub const INFO: &str = "ℹ";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghijkl", 5), "abcd…");
    }

    #[test]
    fn test_default_output_config() {
        let config = OutputConfig::default();
        assert!(!config.quiet);
        assert!(!config.json);
        assert_eq!(config.verbose, 0);
    }

    #[tokio::test]
    async fn test_render_events_drains_channel() {
        let (reporter, rx) = crate::core::events::Reporter::channel();
        reporter.info("hello");
        reporter.progress(40);
        drop(reporter);

        let bar = ProgressBar::hidden();
        render_events(rx, &bar).await;

        assert_eq!(bar.position(), 40);
    }
}
