//! Build event delivery
//!
//! The pipeline runs on a worker task; operator-facing log lines and
//! progress updates travel to the CLI over an unbounded channel. Every event
//! is also recorded through `tracing`.

use serde::Serialize;
use tokio::sync::mpsc;

/// Severity of an operator log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogLevel {
    /// Stage progress
    Info,
    /// Recoverable problem
    Warn,
    /// Failure or fatal signal
    Error,
    /// Raw output of an external tool
    Output,
}

/// Event emitted by a running build or media write
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum BuildEvent {
    /// A log line for the operator
    Log {
        /// Severity
        level: LogLevel,
        /// Message text
        message: String,
    },
    /// Progress moved forward
    Progress {
        /// New value in `0..=100`
        percent: u8,
    },
}

/// Sending half of the event channel
#[derive(Debug, Clone, Default)]
pub struct Reporter {
    tx: Option<mpsc::UnboundedSender<BuildEvent>>,
}

impl Reporter {
    /// Create a reporter and the receiver for its events
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<BuildEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A reporter that only logs through `tracing`
    pub fn silent() -> Self {
        Self::default()
    }

    fn send(&self, event: BuildEvent) {
        if let Some(tx) = &self.tx {
            // The receiver going away only means nobody is watching.
            let _ = tx.send(event);
        }
    }

    fn log(&self, level: LogLevel, message: String) {
        self.send(BuildEvent::Log { level, message });
    }

    /// Report stage progress
    pub fn info(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("{}", message);
        self.log(LogLevel::Info, message);
    }

    /// Report a recoverable problem
    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{}", message);
        self.log(LogLevel::Warn, message);
    }

    /// Report a failure
    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!("{}", message);
        self.log(LogLevel::Error, message);
    }

    /// Relay a line of external tool output
    pub fn output(&self, line: &str) {
        tracing::trace!("{}", line);
        self.log(LogLevel::Output, line.to_string());
    }

    /// Report a new progress value
    pub fn progress(&self, percent: u8) {
        tracing::debug!("Progress: {}%", percent);
        self.send(BuildEvent::Progress { percent });
    }
}
