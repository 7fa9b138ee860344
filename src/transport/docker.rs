//! Docker exec transport.

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::Result;
use crate::pool::ContainerId;

use super::{run_captured, ExecSpec, ExecutionTransport, RawOutcome};

/// Transport that delivers commands via `docker exec`.
#[derive(Clone)]
pub struct DockerExecTransport {
    /// Path to the docker binary.
    docker_bin: String,
}

impl Default for DockerExecTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerExecTransport {
    /// Creates a transport using the default `docker` command.
    pub fn new() -> Self {
        Self {
            docker_bin: "docker".to_string(),
        }
    }

    /// Creates a transport with a custom docker binary path.
    pub fn with_docker_bin(docker_bin: impl Into<String>) -> Self {
        Self {
            docker_bin: docker_bin.into(),
        }
    }

    fn build_exec_args(&self, container: &ContainerId, spec: &ExecSpec) -> Vec<String> {
        let mut args = vec!["exec".to_string()];

        // -i keeps stdin open for piped payloads; -T equivalent is implied
        // because we never allocate a TTY.
        if spec.stdin.is_some() {
            args.push("-i".to_string());
        }

        if let Some(dir) = &spec.working_dir {
            args.push("-w".to_string());
            args.push(dir.clone());
        }

        args.push(container.as_str().to_string());
        args.push("sh".to_string());
        args.push("-c".to_string());
        args.push(spec.command.clone());

        args
    }
}

#[async_trait]
impl ExecutionTransport for DockerExecTransport {
    async fn run(&self, container: &ContainerId, spec: ExecSpec) -> Result<RawOutcome> {
        let args = self.build_exec_args(container, &spec);

        tracing::debug!(container = %container, command = %spec.command, "docker exec");

        let mut command = Command::new(&self.docker_bin);
        command.args(&args);

        run_captured(command, spec.stdin.clone(), spec.max_output_bytes).await
    }

    fn name(&self) -> &str {
        "docker-exec"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exec_args_wrap_command_in_shell() {
        let transport = DockerExecTransport::new();
        let spec = ExecSpec::new("echo hi");

        let args = transport.build_exec_args(&ContainerId::new("box-0"), &spec);

        assert_eq!(args[0], "exec");
        let tail = &args[args.len() - 4..];
        assert_eq!(tail, ["box-0", "sh", "-c", "echo hi"]);
    }

    #[test]
    fn exec_args_include_working_dir() {
        let transport = DockerExecTransport::new();
        let spec = ExecSpec::new("pwd").with_working_dir("/tmp/work");

        let args = transport.build_exec_args(&ContainerId::new("box-0"), &spec);

        assert!(args.contains(&"-w".to_string()));
        assert!(args.contains(&"/tmp/work".to_string()));
    }

    #[test]
    fn exec_args_open_stdin_only_for_payloads() {
        let transport = DockerExecTransport::new();

        let without = transport.build_exec_args(&ContainerId::new("box-0"), &ExecSpec::new("ls"));
        assert!(!without.contains(&"-i".to_string()));

        let with = transport.build_exec_args(
            &ContainerId::new("box-0"),
            &ExecSpec::new("cat").with_stdin(b"x".to_vec()),
        );
        assert!(with.contains(&"-i".to_string()));
    }

    #[test]
    fn docker_transport_has_correct_name() {
        assert_eq!(DockerExecTransport::new().name(), "docker-exec");
    }
}
