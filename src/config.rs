//! Host configuration and validation.
//!
//! Validates configuration before the pool starts to catch errors early.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Configuration for the container pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of warm containers the pool tries to keep.
    #[serde(default = "default_target_size")]
    pub target_size: usize,

    /// Free-container count below which replenishment kicks in.
    #[serde(default = "default_low_watermark")]
    pub low_watermark: usize,

    /// How long `acquire` blocks before failing with `PoolExhausted`.
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout: Duration,

    /// Maximum lifetime of a lease before the reaper reclaims it.
    #[serde(default = "default_lease_ttl")]
    pub lease_ttl: Duration,

    /// Retry attempts for a single provisioning operation.
    #[serde(default = "default_provision_attempts")]
    pub provision_attempts: u32,

    /// Initial backoff between provisioning retries.
    #[serde(default = "default_provision_backoff_initial")]
    pub provision_backoff_initial: Duration,

    /// Backoff cap between provisioning retries.
    #[serde(default = "default_provision_backoff_max")]
    pub provision_backoff_max: Duration,

    /// Interval between lease-reaper sweeps.
    #[serde(default = "default_reap_interval")]
    pub reap_interval: Duration,
}

fn default_target_size() -> usize {
    4
}

fn default_low_watermark() -> usize {
    1
}

fn default_acquire_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_lease_ttl() -> Duration {
    Duration::from_secs(300)
}

fn default_provision_attempts() -> u32 {
    5
}

fn default_provision_backoff_initial() -> Duration {
    Duration::from_millis(200)
}

fn default_provision_backoff_max() -> Duration {
    Duration::from_secs(30)
}

fn default_reap_interval() -> Duration {
    Duration::from_secs(5)
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            target_size: default_target_size(),
            low_watermark: default_low_watermark(),
            acquire_timeout: default_acquire_timeout(),
            lease_ttl: default_lease_ttl(),
            provision_attempts: default_provision_attempts(),
            provision_backoff_initial: default_provision_backoff_initial(),
            provision_backoff_max: default_provision_backoff_max(),
            reap_interval: default_reap_interval(),
        }
    }
}

impl PoolConfig {
    /// Sets the target pool size.
    pub fn with_target_size(mut self, size: usize) -> Self {
        self.target_size = size;
        self
    }

    /// Sets the acquire timeout.
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Sets the lease TTL.
    pub fn with_lease_ttl(mut self, ttl: Duration) -> Self {
        self.lease_ttl = ttl;
        self
    }
}

/// Configuration for command execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Hard wall-clock timeout per execution.
    #[serde(default = "default_execution_timeout")]
    pub execution_timeout: Duration,

    /// Per-stream output capture cap in bytes.
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
}

fn default_execution_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_max_output_bytes() -> usize {
    1024 * 1024
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            execution_timeout: default_execution_timeout(),
            max_output_bytes: default_max_output_bytes(),
        }
    }
}

/// Top-level host configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostConfig {
    /// Pool configuration.
    #[serde(default)]
    pub pool: PoolConfig,

    /// Executor configuration.
    #[serde(default)]
    pub executor: ExecutorConfig,
}

impl HostConfig {
    /// Loads configuration from a TOML file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("failed to parse config: {}", e)))
    }
}

/// Validation result containing all found issues.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// List of validation errors (fatal).
    pub errors: Vec<String>,
    /// List of validation warnings (non-fatal).
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Adds an error to the result.
    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    /// Adds a warning to the result.
    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    /// Merges another validation result into this one.
    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// Converts to a Result, failing if there are errors.
    pub fn into_result(self) -> Result<Vec<String>> {
        if self.is_valid() {
            Ok(self.warnings)
        } else {
            Err(Error::Config(self.errors.join("; ")))
        }
    }
}

/// Trait for validatable configuration types.
pub trait Validate {
    /// Validates the configuration and returns any issues found.
    fn validate(&self) -> ValidationResult;
}

impl Validate for PoolConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.target_size == 0 {
            result.add_error("target_size must be at least 1");
        }

        if self.low_watermark > self.target_size {
            result.add_error("low_watermark cannot exceed target_size");
        }

        if self.provision_attempts == 0 {
            result.add_error("provision_attempts must be at least 1");
        }

        if self.acquire_timeout < Duration::from_millis(100) {
            result.add_warning("acquire_timeout under 100ms will fail under any contention");
        }

        if self.lease_ttl < Duration::from_secs(1) {
            result.add_warning("lease_ttl under 1 second may reap leases mid-execution");
        }

        result
    }
}

impl Validate for ExecutorConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.max_output_bytes == 0 {
            result.add_error("max_output_bytes must be non-zero");
        }

        if self.execution_timeout < Duration::from_millis(100) {
            result.add_warning("execution_timeout under 100ms leaves no room for exec startup");
        }

        if self.execution_timeout > Duration::from_secs(3600) {
            result.add_warning("execution_timeout over 1 hour may indicate a misconfiguration");
        }

        result
    }
}

impl Validate for HostConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = self.pool.validate();
        result.merge(self.executor.validate());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_config_has_sensible_defaults() {
        let config = PoolConfig::default();

        assert_eq!(config.target_size, 4);
        assert_eq!(config.low_watermark, 1);
        assert_eq!(config.acquire_timeout, Duration::from_secs(30));
        assert_eq!(config.provision_attempts, 5);
    }

    #[test]
    fn pool_config_builder_works() {
        let config = PoolConfig::default()
            .with_target_size(8)
            .with_acquire_timeout(Duration::from_secs(5))
            .with_lease_ttl(Duration::from_secs(60));

        assert_eq!(config.target_size, 8);
        assert_eq!(config.acquire_timeout, Duration::from_secs(5));
        assert_eq!(config.lease_ttl, Duration::from_secs(60));
    }

    #[test]
    fn default_config_is_valid() {
        let result = HostConfig::default().validate();
        assert!(result.is_valid());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn zero_target_size_is_rejected() {
        let config = PoolConfig::default().with_target_size(0);
        let result = config.validate();

        assert!(!result.is_valid());
        assert!(result.errors[0].contains("target_size"));
    }

    #[test]
    fn watermark_above_target_is_rejected() {
        let config = PoolConfig {
            target_size: 2,
            low_watermark: 3,
            ..Default::default()
        };

        let result = config.validate();
        assert!(!result.is_valid());
    }

    #[test]
    fn short_timeouts_produce_warnings() {
        let config = ExecutorConfig {
            execution_timeout: Duration::from_millis(10),
            ..Default::default()
        };

        let result = config.validate();
        assert!(result.is_valid());
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn validation_result_converts_to_error() {
        let mut result = ValidationResult::default();
        result.add_error("bad thing");

        assert!(result.into_result().is_err());
    }

    #[test]
    fn config_parses_from_toml() {
        let config = HostConfig::from_toml_str(
            r#"
            [pool]
            target_size = 2
            low_watermark = 1

            [executor]
            max_output_bytes = 4096
            "#,
        )
        .unwrap();

        assert_eq!(config.pool.target_size, 2);
        assert_eq!(config.executor.max_output_bytes, 4096);
        // Unspecified fields fall back to defaults.
        assert_eq!(config.executor.execution_timeout, Duration::from_secs(60));
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let err = HostConfig::from_toml_str("pool = \"not a table\"").unwrap_err();
        assert!(err.to_string().contains("configuration error"));
    }
}
