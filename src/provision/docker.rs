//! Docker-backed provisioning.
//!
//! Containers are started detached with a keep-alive command so they serve as
//! persistent environments for exec delivery, and removed with `docker rm -f`
//! so anything still running inside dies with them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{Error, Result};
use crate::pool::ContainerId;

use super::{ProvisionSpec, Provisioner};

/// Provisioner that runs containers through the `docker` CLI.
#[derive(Clone)]
pub struct DockerProvisioner {
    /// Path to the docker binary.
    docker_bin: String,
    /// Prefix for generated container names.
    name_prefix: String,
    /// Counter for generating unique container names (shared across clones).
    counter: Arc<AtomicU64>,
}

impl Default for DockerProvisioner {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerProvisioner {
    /// Creates a provisioner using the default `docker` command.
    pub fn new() -> Self {
        Self {
            docker_bin: "docker".to_string(),
            name_prefix: "sandbox-host".to_string(),
            counter: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Creates a provisioner with a custom docker binary path.
    pub fn with_docker_bin(docker_bin: impl Into<String>) -> Self {
        Self {
            docker_bin: docker_bin.into(),
            ..Self::new()
        }
    }

    fn generate_container_name(&self) -> String {
        let id = self.counter.fetch_add(1, Ordering::SeqCst);
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        format!("{}-{}-{}", self.name_prefix, timestamp, id)
    }

    fn build_run_args(&self, name: &str, spec: &ProvisionSpec) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            name.to_string(),
        ];

        if let Some(bytes) = spec.limits.memory_bytes {
            args.push("--memory".to_string());
            args.push(bytes.to_string());
        }

        if let Some(cpus) = spec.limits.cpus {
            args.push("--cpus".to_string());
            args.push(cpus.to_string());
        }

        args.push(spec.image.clone());

        // Keep the container alive indefinitely so it can serve exec requests.
        args.push("tail".to_string());
        args.push("-f".to_string());
        args.push("/dev/null".to_string());

        args
    }
}

#[async_trait]
impl Provisioner for DockerProvisioner {
    async fn provision(&self, spec: &ProvisionSpec) -> Result<ContainerId> {
        let name = self.generate_container_name();
        let args = self.build_run_args(&name, spec);

        let output = Command::new(&self.docker_bin).args(&args).output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::ProvisionFailed {
                attempts: 1,
                reason: format!("docker run failed: {}", stderr.trim()),
            });
        }

        tracing::info!(container = %name, image = %spec.image, "provisioned container");

        Ok(ContainerId::new(name))
    }

    async fn destroy(&self, id: &ContainerId) -> Result<()> {
        let output = Command::new(&self.docker_bin)
            .args(["rm", "-f", id.as_str()])
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Transport(format!(
                "docker rm failed for {}: {}",
                id,
                stderr.trim()
            )));
        }

        tracing::info!(container = %id, "destroyed container");
        Ok(())
    }

    fn name(&self) -> &str {
        "docker"
    }
}
