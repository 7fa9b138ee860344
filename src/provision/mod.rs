//! Provisioning interface for creating isolated execution environments.
//!
//! The pool never talks to a backend directly; it goes through the
//! [`Provisioner`] trait so the same pool logic runs against Docker or a
//! plain local-process backend.

mod docker;
mod local;

pub use docker::DockerProvisioner;
pub use local::LocalProvisioner;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::pool::ContainerId;

/// Resource limits applied when a container is provisioned.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Memory cap in bytes, if any.
    pub memory_bytes: Option<u64>,
    /// CPU quota (fractional CPUs), if any.
    pub cpus: Option<f64>,
}

/// Specification for provisioning a new container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionSpec {
    /// Base image reference (ignored by backends without images).
    pub image: String,
    /// Resource limits for the container.
    #[serde(default)]
    pub limits: ResourceLimits,
}

impl ProvisionSpec {
    /// Creates a spec for the given image with no resource limits.
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            limits: ResourceLimits::default(),
        }
    }

    /// Sets the memory cap.
    pub fn with_memory_bytes(mut self, bytes: u64) -> Self {
        self.limits.memory_bytes = Some(bytes);
        self
    }

    /// Sets the CPU quota.
    pub fn with_cpus(mut self, cpus: f64) -> Self {
        self.limits.cpus = Some(cpus);
        self
    }
}

/// Creates and destroys isolated execution environments.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Provisions a new environment and returns its identifier.
    async fn provision(&self, spec: &ProvisionSpec) -> Result<ContainerId>;

    /// Destroys the environment, killing anything still running inside it.
    async fn destroy(&self, id: &ContainerId) -> Result<()>;

    /// Returns the name of this backend.
    fn name(&self) -> &str;
}
