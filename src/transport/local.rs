//! Local-process transport.

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::Result;
use crate::pool::ContainerId;

use super::{run_captured, ExecSpec, ExecutionTransport, RawOutcome};

/// Transport that runs commands in a host shell.
///
/// Pairs with [`crate::provision::LocalProvisioner`]: the container id is a
/// working directory, and commands run inside it unless the spec overrides
/// the working directory.
#[derive(Clone, Default)]
pub struct LocalProcessTransport;

impl LocalProcessTransport {
    /// Creates a local transport.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ExecutionTransport for LocalProcessTransport {
    async fn run(&self, container: &ContainerId, spec: ExecSpec) -> Result<RawOutcome> {
        let working_dir = spec
            .working_dir
            .clone()
            .unwrap_or_else(|| container.as_str().to_string());

        tracing::debug!(dir = %working_dir, command = %spec.command, "local exec");

        let mut command = Command::new("sh");
        command.args(["-c", &spec.command]).current_dir(&working_dir);

        run_captured(command, spec.stdin.clone(), spec.max_output_bytes).await
    }

    fn name(&self) -> &str {
        "local-process"
    }
}
