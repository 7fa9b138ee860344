//! Lease & recovery supervisor.
//!
//! Scoped container acquisition with guaranteed release or retirement on
//! every exit path, plus opportunistic health checks on release.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::executor::{CommandExecutor, ExecutionRequest, ExecutionResult};
use crate::pool::{ContainerHandle, ContainerId, ContainerPool};
use crate::transport::{ExecSpec, ExecutionTransport};

/// Command used to probe container health on release.
const PROBE_COMMAND: &str = "true";

/// Budget for the health probe; a container that cannot answer a no-op in
/// this window is not worth keeping.
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Retires an abandoned lease if its scope is dropped before completing.
///
/// The owner of a dropped `with_lease` future may have left the container in
/// an unknown state, so the drop path retires rather than releases.
struct LeaseGuard {
    pool: ContainerPool,
    container: ContainerId,
    armed: bool,
}

impl LeaseGuard {
    fn new(pool: ContainerPool, container: ContainerId) -> Self {
        Self {
            pool,
            container,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        if self.armed {
            let pool = self.pool.clone();
            let container = self.container.clone();
            tokio::spawn(async move {
                if let Err(e) = pool.retire(&container, "lease scope dropped").await {
                    tracing::debug!(
                        container = %container,
                        error = %e,
                        "abandoned lease was already retired"
                    );
                }
            });
        }
    }
}

/// Hands out containers under supervision: scoped leases, health checks on
/// release, destroy-and-replace for anything suspect.
pub struct LeaseSupervisor {
    pool: ContainerPool,
    executor: Arc<CommandExecutor>,
    transport: Arc<dyn ExecutionTransport>,
}

impl LeaseSupervisor {
    /// Creates a supervisor over `pool`, executing through `executor`.
    pub fn new(
        pool: ContainerPool,
        executor: Arc<CommandExecutor>,
        transport: Arc<dyn ExecutionTransport>,
    ) -> Self {
        Self {
            pool,
            executor,
            transport,
        }
    }

    /// Acquires a container, runs `f` with it, and guarantees the container
    /// leaves the leased state afterwards:
    ///
    /// - healthy completion: health probe, then release (or retire on a
    ///   failed probe)
    /// - `f` returns an error: retire
    /// - executor timeout: the executor already retired the container
    /// - caller cancellation: the drop guard retires the container
    pub async fn with_lease<T, F, Fut>(&self, owner: &str, f: F) -> Result<T>
    where
        F: FnOnce(ContainerHandle) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let handle = self.pool.acquire(owner).await?;
        let mut guard = LeaseGuard::new(self.pool.clone(), handle.container.clone());

        let result = f(handle.clone()).await;

        match &result {
            Ok(_) => {
                if self.probe(&handle.container).await {
                    if let Err(e) = self.pool.release(&handle).await {
                        // Reaper may have reclaimed an expired lease under us.
                        tracing::warn!(
                            container = %handle.container,
                            error = %e,
                            "release after successful execution failed"
                        );
                    }
                } else {
                    self.retire_quietly(&handle.container, "failed health probe on release")
                        .await;
                }
            }
            Err(Error::Timeout { .. }) => {
                // Executor already drained the container.
            }
            Err(e) => {
                self.retire_quietly(&handle.container, &format!("execution failed: {}", e))
                    .await;
            }
        }

        guard.disarm();
        result
    }

    /// Runs one request under a supervised lease.
    pub async fn execute(
        &self,
        owner: &str,
        request: ExecutionRequest,
    ) -> Result<ExecutionResult> {
        let executor = self.executor.clone();
        self.with_lease(owner, |handle| async move {
            executor.execute(&handle, request).await
        })
        .await
    }

    /// Returns a reference to the underlying pool.
    pub fn pool(&self) -> &ContainerPool {
        &self.pool
    }

    /// Cheap in-container no-op; false means the container is not worth
    /// returning to the pool.
    async fn probe(&self, container: &ContainerId) -> bool {
        let spec = ExecSpec::new(PROBE_COMMAND).with_max_output_bytes(1024);

        match tokio::time::timeout(PROBE_TIMEOUT, self.transport.run(container, spec)).await {
            Ok(Ok(outcome)) if outcome.success() => true,
            Ok(Ok(outcome)) => {
                tracing::warn!(
                    container = %container,
                    exit_code = ?outcome.exit_code,
                    "health probe exited non-zero"
                );
                false
            }
            Ok(Err(e)) => {
                tracing::warn!(container = %container, error = %e, "health probe failed");
                false
            }
            Err(_) => {
                tracing::warn!(container = %container, "health probe timed out");
                false
            }
        }
    }

    async fn retire_quietly(&self, container: &ContainerId, reason: &str) {
        if let Err(e) = self.pool.retire(container, reason).await {
            tracing::debug!(container = %container, error = %e, "container already retired");
        }
    }
}
