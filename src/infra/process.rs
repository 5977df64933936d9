//! External process execution
//!
//! Short queries (pacman, repo-add, rsync, umount) go through the
//! [`CommandRunner`] trait so the pipeline can be exercised without the real
//! tools. Long-running tools whose output drives progress (mkarchiso, dd) are
//! streamed line by line with [`stream_lines`].

use std::collections::HashMap;
use std::os::unix::fs::MetadataExt;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::CommandError;

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when killed by a signal
    pub code: Option<i32>,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
}

impl CommandOutput {
    /// Successful output with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given exit code and stderr
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Whether the command exited with status 0
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Convert a non-zero exit into a [`CommandError`]
    pub fn into_result(self, program: &str) -> Result<Self, CommandError> {
        if self.success() {
            Ok(self)
        } else {
            Err(CommandError::Failed {
                program: program.to_string(),
                code: self.code,
                stdout: self.stdout.trim().to_string(),
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

/// Runs a command to completion and captures its output
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`
    ///
    /// Returns `Err` only when the program could not be started; a non-zero
    /// exit is reported through [`CommandOutput::code`].
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, CommandError>;
}

/// Runs commands on the host
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, CommandError> {
        tracing::debug!("Running: {} {}", program, args.join(" "));

        let output = std::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| CommandError::Spawn {
                program: program.to_string(),
                error: e.to_string(),
            })?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Answers commands from a fixed table instead of running them
///
/// Keys are the full command line (`program arg1 arg2`). Unknown commands
/// get the fallback response. Every call is recorded so callers can assert
/// on what would have been executed.
#[derive(Debug)]
pub struct ScriptedRunner {
    responses: HashMap<String, CommandOutput>,
    fallback: CommandOutput,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    /// Create a runner whose unknown commands succeed with empty output
    pub fn new() -> Self {
        Self {
            responses: HashMap::new(),
            fallback: CommandOutput::ok(""),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Set the response for an exact command line
    #[must_use]
    pub fn respond(mut self, command_line: &str, output: CommandOutput) -> Self {
        self.responses.insert(command_line.to_string(), output);
        self
    }

    /// Set the response for commands not in the table
    #[must_use]
    pub fn fallback(mut self, output: CommandOutput) -> Self {
        self.fallback = output;
        self
    }

    /// Command lines received so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }
}

impl Default for ScriptedRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, CommandError> {
        let line = std::iter::once(program)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ");
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(line.clone());
        }
        Ok(self
            .responses
            .get(&line)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone()))
    }
}

/// How a streamed process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamExit {
    /// The process exited on its own
    Exited(Option<i32>),
    /// The process was killed after cancellation was requested
    Cancelled,
}

/// How long a cancelled process may take to exit after SIGTERM
pub const TERM_GRACE: Duration = Duration::from_secs(10);

/// Run a command with stdout and stderr merged, delivering each line to `on_line`
///
/// Both `\n` and `\r` end a line, so tools that redraw a status line (dd)
/// still produce one callback per update. When `cancel` fires the process gets
/// SIGTERM, then SIGKILL after [`TERM_GRACE`], and [`StreamExit::Cancelled`]
/// is returned.
pub async fn stream_lines<F>(
    program: &str,
    args: &[String],
    cancel: &CancellationToken,
    on_line: F,
) -> Result<StreamExit, CommandError>
where
    F: FnMut(&str),
{
    stream_lines_with_grace(program, args, cancel, TERM_GRACE, on_line).await
}

async fn stream_lines_with_grace<F>(
    program: &str,
    args: &[String],
    cancel: &CancellationToken,
    grace: Duration,
    mut on_line: F,
) -> Result<StreamExit, CommandError>
where
    F: FnMut(&str),
{
    tracing::debug!("Streaming: {} {}", program, args.join(" "));

    let spawn_err = |e: std::io::Error| CommandError::Spawn {
        program: program.to_string(),
        error: e.to_string(),
    };

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(spawn_err)?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(forward_lines(stdout, tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(forward_lines(stderr, tx.clone()));
    }
    drop(tx);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::info!("Cancellation requested, terminating {}", program);
                terminate(&mut child, program, grace).await;
                return Ok(StreamExit::Cancelled);
            }
            line = rx.recv() => match line {
                Some(line) => on_line(&line),
                None => break,
            },
        }
    }

    let status = tokio::select! {
        biased;
        () = cancel.cancelled() => {
            terminate(&mut child, program, grace).await;
            return Ok(StreamExit::Cancelled);
        }
        status = child.wait() => status.map_err(spawn_err)?,
    };

    Ok(StreamExit::Exited(status.code()))
}

/// Ask `child` to stop with SIGTERM and kill it if it outlives `grace`
///
/// mkarchiso unmounts its chroot and reaps pacstrap and mksquashfs on SIGTERM;
/// SIGKILL would leave both behind.
async fn terminate(child: &mut Child, program: &str, grace: Duration) {
    if let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) {
        tracing::debug!("Sending SIGTERM to {} (pid {})", program, pid);
        // SAFETY: kill() only sends a signal; pid is our own child, not yet reaped.
        #[allow(unsafe_code)]
        let term_ret = unsafe { libc::kill(pid, libc::SIGTERM) };
        if term_ret == 0 {
            match tokio::time::timeout(grace, child.wait()).await {
                Ok(status) => {
                    tracing::debug!("{} stopped after SIGTERM: {:?}", program, status);
                    return;
                }
                Err(_) => tracing::warn!(
                    "{} still running {:?} after SIGTERM, killing it",
                    program,
                    grace
                ),
            }
        } else {
            let errno = std::io::Error::last_os_error();
            tracing::debug!("SIGTERM to pid {} failed: {}", pid, errno);
        }
    }
    let _ = child.start_kill();
    let _ = child.wait().await;
}

async fn forward_lines<R>(reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();

    loop {
        let (consumed, complete) = {
            let buf = match reader.fill_buf().await {
                Ok(buf) => buf,
                Err(e) => {
                    tracing::debug!("Output stream closed: {}", e);
                    break;
                }
            };
            if buf.is_empty() {
                break;
            }
            match buf.iter().position(|b| *b == b'\n' || *b == b'\r') {
                Some(pos) => {
                    line.extend_from_slice(&buf[..pos]);
                    (pos + 1, true)
                }
                None => {
                    line.extend_from_slice(buf);
                    (buf.len(), false)
                }
            }
        };
        reader.consume(consumed);

        if complete {
            if !line.is_empty() && tx.send(String::from_utf8_lossy(&line).into_owned()).is_err() {
                return;
            }
            line.clear();
        }
    }

    if !line.is_empty() {
        let _ = tx.send(String::from_utf8_lossy(&line).into_owned());
    }
}

/// Whether the current process runs with root privileges
pub fn running_as_root() -> bool {
    std::fs::metadata("/proc/self")
        .map(|meta| meta.uid() == 0)
        .unwrap_or(false)
}

/// Whether a program can be found in PATH
pub fn tool_available(program: &str) -> bool {
    which::which(program).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_runner_records_calls() {
        let runner = ScriptedRunner::new()
            .respond("pacman -Si foo", CommandOutput::failed(1, "error: package 'foo' was not found"));

        let out = runner.run("pacman", &["-Si", "foo"]).unwrap();
        let other = runner.run("pacman", &["-Si", "bar"]).unwrap();

        assert!(!out.success());
        assert!(other.success());
        assert_eq!(runner.calls(), vec!["pacman -Si foo", "pacman -Si bar"]);
    }

    #[test]
    fn test_into_result_reports_failure() {
        let err = CommandOutput::failed(2, "boom\n")
            .into_result("repo-add")
            .unwrap_err();

        assert!(err.to_string().contains("repo-add"));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_into_result_keeps_stdout_diagnostics() {
        let output = CommandOutput {
            code: Some(1),
            stdout: "==> ERROR: Package 'foo' is not a valid package\n".to_string(),
            stderr: String::new(),
        };

        let err = output.into_result("repo-add").unwrap_err();

        assert_eq!(
            err.to_string(),
            "'repo-add' exited with code Some(1): ==> ERROR: Package 'foo' is not a valid package"
        );
    }

    #[test]
    fn test_into_result_joins_both_streams() {
        let output = CommandOutput {
            code: Some(2),
            stdout: "checking\n".to_string(),
            stderr: "failed\n".to_string(),
        };

        let message = output.into_result("pacman").unwrap_err().to_string();

        assert!(message.ends_with("checking\nfailed"), "{message}");
    }

    #[tokio::test]
    async fn test_stream_lines_merges_stdout_and_stderr() {
        let cancel = CancellationToken::new();
        let mut lines = Vec::new();

        let exit = stream_lines(
            "sh",
            &["-c".to_string(), "echo out; echo err >&2; printf 'a\\rb\\n'".to_string()],
            &cancel,
            |line| lines.push(line.to_string()),
        )
        .await
        .unwrap();

        assert_eq!(exit, StreamExit::Exited(Some(0)));
        lines.sort();
        assert_eq!(lines, vec!["a", "b", "err", "out"]);
    }

    #[tokio::test]
    async fn test_stream_lines_reports_exit_code() {
        let cancel = CancellationToken::new();

        let exit = stream_lines("sh", &["-c".to_string(), "exit 3".to_string()], &cancel, |_| {})
            .await
            .unwrap();

        assert_eq!(exit, StreamExit::Exited(Some(3)));
    }

    #[tokio::test]
    async fn test_stream_lines_cancellation_kills_process() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        let exit = stream_lines(
            "sh",
            &["-c".to_string(), "echo started; sleep 30".to_string()],
            &cancel,
            move |line| {
                if line == "started" {
                    trigger.cancel();
                }
            },
        )
        .await
        .unwrap();

        assert_eq!(exit, StreamExit::Cancelled);
    }

    #[tokio::test]
    async fn test_cancellation_lets_process_clean_up() {
        let temp = tempfile::TempDir::new().unwrap();
        let marker = temp.path().join("cleaned-up");
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        let exit = stream_lines(
            "sh",
            &[
                "-c".to_string(),
                "trap 'echo done > \"$0\"; exit 0' TERM; echo started; while :; do sleep 0.1; done".to_string(),
                marker.to_string_lossy().into_owned(),
            ],
            &cancel,
            move |line| {
                if line == "started" {
                    trigger.cancel();
                }
            },
        )
        .await
        .unwrap();

        assert_eq!(exit, StreamExit::Cancelled);
        assert_eq!(std::fs::read_to_string(&marker).unwrap(), "done\n");
    }

    #[tokio::test]
    async fn test_cancellation_kills_process_ignoring_term() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let started = std::time::Instant::now();

        let exit = stream_lines_with_grace(
            "sh",
            &[
                "-c".to_string(),
                "trap '' TERM; echo started; while :; do sleep 0.1; done".to_string(),
            ],
            &cancel,
            Duration::from_millis(300),
            move |line| {
                if line == "started" {
                    trigger.cancel();
                }
            },
        )
        .await
        .unwrap();

        assert_eq!(exit, StreamExit::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_stream_lines_missing_program() {
        let cancel = CancellationToken::new();

        let result = stream_lines("definitely-not-a-real-program-xyz", &[], &cancel, |_| {}).await;

        assert!(matches!(result, Err(CommandError::Spawn { .. })));
    }
}
