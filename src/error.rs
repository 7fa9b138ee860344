//! Error types for the sandbox execution host.

use std::time::Duration;
use thiserror::Error;

use crate::pool::ContainerId;

/// Top-level error type for pool and execution operations.
#[derive(Error, Debug)]
pub enum Error {
    /// No container became available within the acquire timeout.
    #[error("pool exhausted: no container became available within {waited:?}")]
    PoolExhausted { waited: Duration },

    /// Provisioning a new container failed after all retry attempts.
    #[error("failed to provision container after {attempts} attempts: {reason}")]
    ProvisionFailed { attempts: u32, reason: String },

    /// A container failed its health probe or is otherwise unusable.
    #[error("container {id} is unhealthy: {reason}")]
    ContainerUnhealthy { id: ContainerId, reason: String },

    /// Execution exceeded its wall-clock timeout.
    #[error("execution timed out after {limit:?}")]
    Timeout { limit: Duration },

    /// Execution transport failure (exec delivery, stream capture).
    #[error("transport failure: {0}")]
    Transport(String),

    /// IO error during pool or execution operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Source payload could not be prepared for execution.
    #[error("invalid source: {0}")]
    InvalidSource(String),

    /// The pool is shutting down and no longer hands out containers.
    #[error("pool is shutting down")]
    ShuttingDown,
}

/// Result type alias for pool and execution operations.
pub type Result<T> = std::result::Result<T, Error>;
