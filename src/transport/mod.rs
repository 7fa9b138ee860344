//! Execution transport: delivering commands into containers and capturing
//! their output.
//!
//! Transports are treated as unreliable; the executor owns the wall-clock
//! timeout and kills the delivery process when it fires.

mod docker;
mod local;

pub use docker::DockerExecTransport;
pub use local::LocalProcessTransport;

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use crate::error::{Error, Result};
use crate::pool::ContainerId;

/// A command to deliver into a container.
#[derive(Debug, Clone)]
pub struct ExecSpec {
    /// Shell command to run (passed to `sh -c`).
    pub command: String,
    /// Bytes to feed to the command's stdin, if any.
    pub stdin: Option<Vec<u8>>,
    /// Working directory inside the container, if any.
    pub working_dir: Option<String>,
    /// Per-stream capture cap in bytes.
    pub max_output_bytes: usize,
}

impl ExecSpec {
    /// Creates a spec for `command` with a default 1 MiB capture cap.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            stdin: None,
            working_dir: None,
            max_output_bytes: 1024 * 1024,
        }
    }

    /// Sets the stdin payload.
    pub fn with_stdin(mut self, stdin: Vec<u8>) -> Self {
        self.stdin = Some(stdin);
        self
    }

    /// Sets the working directory.
    pub fn with_working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Sets the per-stream capture cap.
    pub fn with_max_output_bytes(mut self, cap: usize) -> Self {
        self.max_output_bytes = cap;
        self
    }
}

/// Raw outcome of a delivered command.
#[derive(Debug, Clone)]
pub struct RawOutcome {
    /// Exit code, if the process exited normally.
    pub exit_code: Option<i32>,
    /// Captured stdout, up to the cap.
    pub stdout: String,
    /// Captured stderr, up to the cap.
    pub stderr: String,
    /// Whether either stream hit the capture cap.
    pub truncated: bool,
}

impl RawOutcome {
    /// Returns whether the command exited with status zero.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Delivers commands into running containers.
#[async_trait]
pub trait ExecutionTransport: Send + Sync {
    /// Runs `spec` inside `container` and captures its output.
    ///
    /// The returned future must kill the delivery process when dropped, so a
    /// caller-side timeout does not leave it running.
    async fn run(&self, container: &ContainerId, spec: ExecSpec) -> Result<RawOutcome>;

    /// Returns the name of this transport.
    fn name(&self) -> &str;
}

/// Byte buffer that stops growing at a cap and remembers that it did.
#[derive(Debug)]
struct OutputBuffer {
    buf: Vec<u8>,
    cap: usize,
    truncated: bool,
}

impl OutputBuffer {
    fn new(cap: usize) -> Self {
        Self {
            buf: Vec::new(),
            cap,
            truncated: false,
        }
    }

    /// Appends `chunk`, dropping anything past the cap.
    fn push(&mut self, chunk: &[u8]) {
        let remaining = self.cap.saturating_sub(self.buf.len());
        if chunk.len() > remaining {
            self.buf.extend_from_slice(&chunk[..remaining]);
            self.truncated = true;
        } else {
            self.buf.extend_from_slice(chunk);
        }
    }

    fn truncated(&self) -> bool {
        self.truncated
    }

    fn into_string(self) -> String {
        String::from_utf8_lossy(&self.buf).into_owned()
    }
}

/// Spawns `command`, feeds it `stdin`, and captures both streams up to
/// `max_output_bytes` each.
///
/// The child is spawned with kill-on-drop so an abandoned future (executor
/// timeout) terminates the delivery process.
pub(crate) async fn run_captured(
    mut command: Command,
    stdin: Option<Vec<u8>>,
    max_output_bytes: usize,
) -> Result<RawOutcome> {
    command
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .kill_on_drop(true);

    let mut child = command
        .spawn()
        .map_err(|e| Error::Transport(format!("failed to spawn exec process: {}", e)))?;

    // Write stdin from its own task so writing and output draining proceed
    // concurrently; a payload past the pipe buffer would otherwise wedge
    // against a child blocked on a full stdout pipe.
    if let Some(payload) = stdin {
        let mut handle = child.stdin.take().expect("stdin was piped");
        tokio::spawn(async move {
            if let Err(e) = handle.write_all(&payload).await {
                // The child may exit without draining stdin; its own exit
                // status is the signal that matters.
                tracing::debug!(error = %e, "exec stdin write ended early");
            }
            // Dropping the handle closes the pipe so the child sees EOF.
        });
    }

    let mut stdout = child.stdout.take().expect("stdout was piped");
    let mut stderr = child.stderr.take().expect("stderr was piped");

    let mut stdout_buf = OutputBuffer::new(max_output_bytes);
    let mut stderr_buf = OutputBuffer::new(max_output_bytes);

    let mut stdout_chunk = [0u8; 4096];
    let mut stderr_chunk = [0u8; 4096];
    let mut stdout_open = true;
    let mut stderr_open = true;

    // Drain both streams concurrently; the child can block on a full pipe if
    // either stream is left unread.
    while stdout_open || stderr_open {
        tokio::select! {
            read = stdout.read(&mut stdout_chunk), if stdout_open => {
                match read {
                    Ok(0) => stdout_open = false,
                    Ok(n) => stdout_buf.push(&stdout_chunk[..n]),
                    Err(e) => {
                        tracing::error!(error = %e, "error reading exec stdout");
                        stdout_open = false;
                    }
                }
            }
            read = stderr.read(&mut stderr_chunk), if stderr_open => {
                match read {
                    Ok(0) => stderr_open = false,
                    Ok(n) => stderr_buf.push(&stderr_chunk[..n]),
                    Err(e) => {
                        tracing::error!(error = %e, "error reading exec stderr");
                        stderr_open = false;
                    }
                }
            }
        }
    }

    let status = child
        .wait()
        .await
        .map_err(|e| Error::Transport(format!("failed to wait for exec process: {}", e)))?;

    let truncated = stdout_buf.truncated() || stderr_buf.truncated();

    Ok(RawOutcome {
        exit_code: status.code(),
        stdout: stdout_buf.into_string(),
        stderr: stderr_buf.into_string(),
        truncated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exec_spec_builder_works() {
        let spec = ExecSpec::new("echo hi")
            .with_stdin(b"input".to_vec())
            .with_working_dir("/work")
            .with_max_output_bytes(512);

        assert_eq!(spec.command, "echo hi");
        assert_eq!(spec.stdin.as_deref(), Some(b"input".as_slice()));
        assert_eq!(spec.working_dir.as_deref(), Some("/work"));
        assert_eq!(spec.max_output_bytes, 512);
    }

    #[test]
    fn output_buffer_keeps_everything_under_cap() {
        let mut buf = OutputBuffer::new(16);
        buf.push(b"hello ");
        buf.push(b"world");

        assert!(!buf.truncated());
        assert_eq!(buf.into_string(), "hello world");
    }

    #[test]
    fn output_buffer_truncates_at_cap() {
        let mut buf = OutputBuffer::new(8);
        buf.push(b"0123456789");

        assert!(buf.truncated());
        assert_eq!(buf.into_string(), "01234567");
    }

    #[test]
    fn output_buffer_truncates_across_pushes() {
        let mut buf = OutputBuffer::new(8);
        buf.push(b"01234");
        buf.push(b"56789");

        assert!(buf.truncated());
        assert_eq!(buf.into_string(), "01234567");
    }

    #[test]
    fn raw_outcome_success_requires_zero_exit() {
        let mut outcome = RawOutcome {
            exit_code: Some(0),
            stdout: String::new(),
            stderr: String::new(),
            truncated: false,
        };
        assert!(outcome.success());

        outcome.exit_code = Some(1);
        assert!(!outcome.success());

        outcome.exit_code = None;
        assert!(!outcome.success());
    }

    #[tokio::test]
    async fn run_captured_collects_both_streams() {
        let mut command = Command::new("sh");
        command.args(["-c", "echo out; echo err >&2"]);

        let outcome = run_captured(command, None, 1024).await.unwrap();

        assert_eq!(outcome.exit_code, Some(0));
        assert_eq!(outcome.stdout.trim(), "out");
        assert_eq!(outcome.stderr.trim(), "err");
        assert!(!outcome.truncated);
    }

    #[tokio::test]
    async fn run_captured_feeds_stdin() {
        let mut command = Command::new("sh");
        command.args(["-c", "cat"]);

        let outcome = run_captured(command, Some(b"payload".to_vec()), 1024)
            .await
            .unwrap();

        assert_eq!(outcome.stdout, "payload");
    }

    #[tokio::test]
    async fn run_captured_round_trips_stdin_past_the_pipe_buffer() {
        // `cat` reads and writes in lockstep, so a payload well past the OS
        // pipe buffer stalls forever unless stdin is fed while stdout drains.
        let payload = vec![b'x'; 1024 * 1024];
        let mut command = Command::new("sh");
        command.args(["-c", "cat"]);

        let outcome = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            run_captured(command, Some(payload.clone()), 2 * 1024 * 1024),
        )
        .await
        .expect("large stdin payload stalled the exec")
        .unwrap();

        assert_eq!(outcome.exit_code, Some(0));
        assert_eq!(outcome.stdout.len(), payload.len());
        assert!(!outcome.truncated);
    }

    #[tokio::test]
    async fn run_captured_reports_truncation() {
        let mut command = Command::new("sh");
        command.args(["-c", "head -c 100000 /dev/zero | tr '\\0' 'x'"]);

        let outcome = run_captured(command, None, 1024).await.unwrap();

        assert!(outcome.truncated);
        assert_eq!(outcome.stdout.len(), 1024);
    }

    #[tokio::test]
    async fn run_captured_surfaces_exit_code() {
        let mut command = Command::new("sh");
        command.args(["-c", "exit 3"]);

        let outcome = run_captured(command, None, 1024).await.unwrap();

        assert_eq!(outcome.exit_code, Some(3));
        assert!(!outcome.success());
    }
}
