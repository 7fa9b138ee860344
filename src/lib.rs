//! Sandbox Execution Host - pooled container manager for running untrusted code
//!
//! This library maintains a pool of long-lived, pre-warmed isolated execution
//! containers, leases them to callers, runs commands inside them with
//! timeouts and capped output capture, and replaces anything unhealthy.

pub mod backoff;
pub mod config;
pub mod error;
pub mod executor;
pub mod language;
pub mod pool;
pub mod provision;
pub mod supervisor;
pub mod transport;

pub use backoff::ExponentialBackoff;
pub use config::{ExecutorConfig, HostConfig, PoolConfig, Validate, ValidationResult};
pub use error::Error;
pub use executor::{CommandExecutor, ExecutionRequest, ExecutionResult};
pub use language::Language;
pub use pool::{ContainerHandle, ContainerId, ContainerPool, ContainerState, ContainerSummary, Lease};
pub use provision::{
    DockerProvisioner, LocalProvisioner, ProvisionSpec, Provisioner, ResourceLimits,
};
pub use supervisor::LeaseSupervisor;
pub use transport::{DockerExecTransport, ExecSpec, ExecutionTransport, LocalProcessTransport, RawOutcome};
