//! Command executor.
//!
//! Runs a command inside a leased container with a hard wall-clock timeout
//! and capped output capture.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::config::ExecutorConfig;
use crate::error::{Error, Result};
use crate::pool::{ContainerHandle, ContainerPool};
use crate::transport::{ExecSpec, ExecutionTransport};

/// One command invocation against a leased container.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    /// Shell command to run inside the container.
    pub command: String,
    /// Bytes to feed to the command's stdin, if any.
    pub stdin: Option<Vec<u8>>,
    /// Working directory inside the container, if any.
    pub working_dir: Option<String>,
    /// Wall-clock timeout override; falls back to the executor config.
    pub timeout: Option<Duration>,
    /// Output cap override; falls back to the executor config.
    pub max_output_bytes: Option<usize>,
}

impl ExecutionRequest {
    /// Creates a request for `command` with config-default limits.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            stdin: None,
            working_dir: None,
            timeout: None,
            max_output_bytes: None,
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

    /// Sets a per-request wall-clock timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets a per-request output cap.
    pub fn with_max_output_bytes(mut self, cap: usize) -> Self {
        self.max_output_bytes = Some(cap);
        self
    }
}

/// Result of a completed execution.
///
/// A non-zero exit code is a result, not an error; only infrastructure
/// failures surface as `Error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Unique identifier for this execution.
    pub execution_id: String,
    /// Exit code, if the process exited normally.
    pub exit_code: Option<i32>,
    /// Captured stdout, up to the cap.
    pub stdout: String,
    /// Captured stderr, up to the cap.
    pub stderr: String,
    /// Wall-clock duration of the execution.
    pub duration: Duration,
    /// Whether output capture hit the byte cap.
    pub truncated: bool,
}

impl ExecutionResult {
    /// Returns whether the command exited with status zero.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Executes commands inside leased containers.
pub struct CommandExecutor {
    transport: Arc<dyn ExecutionTransport>,
    pool: ContainerPool,
    config: ExecutorConfig,
}

impl CommandExecutor {
    /// Creates an executor over `transport` for containers managed by `pool`.
    pub fn new(
        transport: Arc<dyn ExecutionTransport>,
        pool: ContainerPool,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            transport,
            pool,
            config,
        }
    }

    /// Runs `request` inside the leased container.
    ///
    /// Enforces the wall-clock timeout; on expiry the delivery process is
    /// killed and the container is retired (side effects of a killed process
    /// are not trusted), and the call fails with `Timeout`.
    pub async fn execute(
        &self,
        handle: &ContainerHandle,
        request: ExecutionRequest,
    ) -> Result<ExecutionResult> {
        let execution_id = uuid::Uuid::new_v4().to_string();
        let timeout = request.timeout.unwrap_or(self.config.execution_timeout);
        let cap = request
            .max_output_bytes
            .unwrap_or(self.config.max_output_bytes);

        let mut spec = ExecSpec::new(request.command.clone()).with_max_output_bytes(cap);
        if let Some(stdin) = request.stdin {
            spec = spec.with_stdin(stdin);
        }
        if let Some(dir) = request.working_dir {
            spec = spec.with_working_dir(dir);
        }

        tracing::info!(
            execution_id = %execution_id,
            container = %handle.container,
            timeout = ?timeout,
            "executing command"
        );

        let start = Instant::now();
        let outcome = tokio::time::timeout(timeout, self.transport.run(&handle.container, spec)).await;
        let duration = start.elapsed();

        match outcome {
            Ok(Ok(raw)) => {
                tracing::info!(
                    execution_id = %execution_id,
                    exit_code = ?raw.exit_code,
                    duration = ?duration,
                    truncated = raw.truncated,
                    "execution completed"
                );

                Ok(ExecutionResult {
                    execution_id,
                    exit_code: raw.exit_code,
                    stdout: raw.stdout,
                    stderr: raw.stderr,
                    duration,
                    truncated: raw.truncated,
                })
            }
            Ok(Err(e)) => {
                tracing::error!(execution_id = %execution_id, error = %e, "execution transport failed");
                Err(e)
            }
            Err(_elapsed) => {
                // Dropping the transport future kills the delivery process;
                // retiring the container kills anything left inside it.
                if let Err(e) = self
                    .pool
                    .retire(&handle.container, "execution timed out")
                    .await
                {
                    tracing::warn!(
                        container = %handle.container,
                        error = %e,
                        "failed to retire timed-out container"
                    );
                }

                Err(Error::Timeout { limit: timeout })
            }
        }
    }
}
