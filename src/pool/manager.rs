//! Container pool manager.
//!
//! Maintains a set of long-lived, pre-warmed containers and satisfies
//! allocation requests with low latency. All record mutation happens here,
//! under the free-list lock and the per-record locks.
//!
//! Lock order is free-list, then the record registry, then a record. Nothing
//! is mutated until every needed lock is held, so a cancelled `acquire` or
//! `release` future never leaves a container half-claimed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Mutex, Notify};
use uuid::Uuid;

use crate::backoff::ExponentialBackoff;
use crate::config::{PoolConfig, Validate};
use crate::error::{Error, Result};
use crate::provision::{ProvisionSpec, Provisioner};

use super::record::{ContainerId, ContainerRecord, ContainerState, ContainerSummary, Lease};

/// A caller's claim on one container, returned by [`ContainerPool::acquire`].
#[derive(Debug, Clone)]
pub struct ContainerHandle {
    /// The leased container.
    pub container: ContainerId,
    /// The lease backing this handle.
    pub lease_id: Uuid,
    /// Caller identity the lease was granted to.
    pub owner: String,
}

/// Entry in the pool free-list.
struct FreeEntry {
    record: Arc<Mutex<ContainerRecord>>,
    /// Copy of the record's `last_used`, so longest-idle selection does not
    /// need the record lock.
    since: Instant,
}

struct PoolInner {
    config: PoolConfig,
    spec: ProvisionSpec,
    provisioner: Arc<dyn Provisioner>,
    /// Containers eligible for leasing. Only mutated under this lock.
    free: Mutex<Vec<FreeEntry>>,
    /// Registry of every live (non-Dead) container.
    records: Mutex<HashMap<ContainerId, Arc<Mutex<ContainerRecord>>>>,
    /// Signalled after a container lands on the free-list.
    released: Notify,
    /// Live containers (Idle or Leased), kept for replenishment math.
    live: AtomicUsize,
    /// Provisioning tasks currently running.
    provisions_in_flight: AtomicUsize,
    shutting_down: AtomicBool,
}

/// Manages the container pool: leasing, release, retirement, replenishment.
#[derive(Clone)]
pub struct ContainerPool {
    inner: Arc<PoolInner>,
}

impl ContainerPool {
    /// Provisions the initial pool and starts the lease reaper.
    ///
    /// Fails with `ProvisionFailed` if the initial pool cannot be built;
    /// anything provisioned up to that point is destroyed again.
    pub async fn start(
        config: PoolConfig,
        spec: ProvisionSpec,
        provisioner: Arc<dyn Provisioner>,
    ) -> Result<Self> {
        for warning in config.validate().into_result()? {
            tracing::warn!(warning = %warning, "pool configuration warning");
        }

        let pool = Self {
            inner: Arc::new(PoolInner {
                config,
                spec,
                provisioner,
                free: Mutex::new(Vec::new()),
                records: Mutex::new(HashMap::new()),
                released: Notify::new(),
                live: AtomicUsize::new(0),
                provisions_in_flight: AtomicUsize::new(0),
                shutting_down: AtomicBool::new(false),
            }),
        };

        for _ in 0..pool.inner.config.target_size {
            match pool.provision_with_retry().await {
                Ok(id) => {
                    pool.adopt(id).await;
                }
                Err(e) => {
                    pool.shutdown().await;
                    return Err(e);
                }
            }
        }

        tracing::info!(
            size = pool.inner.config.target_size,
            backend = pool.inner.provisioner.name(),
            "container pool started"
        );

        pool.spawn_reaper();

        Ok(pool)
    }

    /// Leases a container to `owner`, blocking up to the configured acquire
    /// timeout.
    ///
    /// The longest-idle container is chosen first. Fails with `PoolExhausted`
    /// when the timeout elapses, or `ShuttingDown` during teardown.
    /// Cancellation-safe: a dropped future holds nothing.
    pub async fn acquire(&self, owner: &str) -> Result<ContainerHandle> {
        let start = Instant::now();
        let deadline = start + self.inner.config.acquire_timeout;

        loop {
            if self.inner.shutting_down.load(Ordering::SeqCst) {
                return Err(Error::ShuttingDown);
            }

            if let Some(handle) = self.try_acquire(owner).await {
                tracing::debug!(
                    container = %handle.container,
                    owner = %owner,
                    "leased container"
                );

                // Proactive top-up once the free-list dips below the
                // low-watermark.
                if self.free_count().await < self.inner.config.low_watermark {
                    self.maybe_replenish().await;
                }

                return Ok(handle);
            }

            self.maybe_replenish().await;

            let now = Instant::now();
            if now >= deadline {
                return Err(Error::PoolExhausted {
                    waited: start.elapsed(),
                });
            }

            // A release between try_acquire and this await stores a permit in
            // the Notify, so the wakeup is not lost.
            let _ = tokio::time::timeout(deadline - now, self.inner.released.notified()).await;
        }
    }

    /// Attempts to lease the longest-idle free container.
    ///
    /// The entry stays on the free-list until its record lock is held, so a
    /// future dropped mid-acquire leaves the list intact.
    async fn try_acquire(&self, owner: &str) -> Option<ContainerHandle> {
        let mut free = self.inner.free.lock().await;

        loop {
            let idx = free
                .iter()
                .enumerate()
                .min_by_key(|(_, entry)| entry.since)?
                .0;
            let record_arc = free[idx].record.clone();

            // Record locks are only ever held briefly and never while
            // waiting on the free-list, so this cannot deadlock.
            let mut record = record_arc.lock().await;
            free.swap_remove(idx);

            if !record.transition(ContainerState::Leased) {
                tracing::warn!(
                    container = %record.id,
                    state = %record.state,
                    "free-list entry was not idle, dropping it"
                );
                continue;
            }

            let lease = Lease::new(record.id.clone(), owner, self.inner.config.lease_ttl);
            let handle = ContainerHandle {
                container: record.id.clone(),
                lease_id: lease.id,
                owner: lease.owner.clone(),
            };
            record.lease = Some(lease);

            return Some(handle);
        }
    }

    /// Returns a healthy container to the pool.
    ///
    /// The container lands on the free-list before any waiter is woken, so a
    /// subsequent acquire always observes the release.
    pub async fn release(&self, handle: &ContainerHandle) -> Result<()> {
        let mut free = self.inner.free.lock().await;
        let record_arc = self.lookup(&handle.container).await?;
        let mut record = record_arc.lock().await;

        self.check_lease(&record, handle)?;

        if !record.transition(ContainerState::Idle) {
            return Err(Error::ContainerUnhealthy {
                id: handle.container.clone(),
                reason: format!("cannot release from state {}", record.state),
            });
        }

        let since = record.last_used;
        drop(record);

        free.push(FreeEntry {
            record: record_arc,
            since,
        });
        drop(free);

        self.inner.released.notify_one();

        tracing::debug!(container = %handle.container, owner = %handle.owner, "released container");
        Ok(())
    }

    /// Removes a container from service and schedules its destruction and a
    /// replacement.
    ///
    /// Used for timed-out executions, failed health checks, and expired
    /// leases. The container transitions to Draining immediately and is never
    /// leased again.
    pub async fn retire(&self, container: &ContainerId, reason: &str) -> Result<()> {
        {
            let mut free = self.inner.free.lock().await;
            let record_arc = self.lookup(container).await?;
            let mut record = record_arc.lock().await;

            if !record.transition(ContainerState::Draining) {
                return Err(Error::ContainerUnhealthy {
                    id: container.clone(),
                    reason: format!("cannot retire from state {}", record.state),
                });
            }

            free.retain(|entry| !Arc::ptr_eq(&entry.record, &record_arc));
        }

        self.inner.live.fetch_sub(1, Ordering::SeqCst);

        tracing::warn!(container = %container, reason = %reason, "retiring container");

        // Destroy and replace off the caller's path so retire returns fast
        // and survives caller cancellation.
        let pool = self.clone();
        let container = container.clone();
        tokio::spawn(async move {
            pool.reclaim(&container).await;
            pool.maybe_replenish().await;
        });

        Ok(())
    }

    /// Destroys a Draining container and removes it from the registry.
    async fn reclaim(&self, container: &ContainerId) {
        if let Err(e) = self.inner.provisioner.destroy(container).await {
            // The backend may already have lost the container; either way it
            // is unusable and leaves the pool.
            tracing::error!(container = %container, error = %e, "destroy failed during reclaim");
        }

        let record_arc = { self.inner.records.lock().await.remove(container) };

        if let Some(record_arc) = record_arc {
            let mut record = record_arc.lock().await;
            record.transition(ContainerState::Dead);
            tracing::info!(container = %container, "container reclaimed");
        }
    }

    /// Tears down the pool, destroying every container.
    ///
    /// Blocked acquires fail with `ShuttingDown`.
    pub async fn shutdown(&self) {
        self.inner.shutting_down.store(true, Ordering::SeqCst);
        self.inner.released.notify_waiters();

        self.inner.free.lock().await.clear();

        let records: Vec<(ContainerId, Arc<Mutex<ContainerRecord>>)> = {
            let mut map = self.inner.records.lock().await;
            map.drain().collect()
        };

        for (id, record_arc) in records {
            {
                let mut record = record_arc.lock().await;
                if record.state == ContainerState::Idle || record.state == ContainerState::Leased {
                    record.transition(ContainerState::Draining);
                    self.inner.live.fetch_sub(1, Ordering::SeqCst);
                }
            }

            tracing::warn!(container = %id, reason = "pool shutdown", "retiring container");

            if let Err(e) = self.inner.provisioner.destroy(&id).await {
                tracing::error!(container = %id, error = %e, "destroy failed during shutdown");
            }

            record_arc.lock().await.transition(ContainerState::Dead);
        }

        tracing::info!("container pool shut down");
    }

    /// Number of live (Idle or Leased) containers.
    pub fn size(&self) -> usize {
        self.inner.live.load(Ordering::SeqCst)
    }

    /// Number of containers currently eligible for leasing.
    pub async fn free_count(&self) -> usize {
        self.inner.free.lock().await.len()
    }

    /// Snapshots every registered container, for status output.
    pub async fn summaries(&self) -> Vec<ContainerSummary> {
        let records: Vec<Arc<Mutex<ContainerRecord>>> =
            { self.inner.records.lock().await.values().cloned().collect() };

        let mut out = Vec::with_capacity(records.len());
        for record_arc in records {
            let record = record_arc.lock().await;
            out.push(ContainerSummary::from(&*record));
        }
        out
    }

    async fn lookup(&self, container: &ContainerId) -> Result<Arc<Mutex<ContainerRecord>>> {
        self.inner
            .records
            .lock()
            .await
            .get(container)
            .cloned()
            .ok_or_else(|| Error::ContainerUnhealthy {
                id: container.clone(),
                reason: "unknown container (stale handle)".to_string(),
            })
    }

    fn check_lease(&self, record: &ContainerRecord, handle: &ContainerHandle) -> Result<()> {
        match &record.lease {
            Some(lease) if lease.id == handle.lease_id => Ok(()),
            _ => Err(Error::ContainerUnhealthy {
                id: handle.container.clone(),
                reason: "lease no longer active".to_string(),
            }),
        }
    }

    /// Registers a freshly provisioned container as Idle and wakes a waiter.
    ///
    /// Returns false without registering when the pool is shutting down. The
    /// flag is read under the registry lock, so a container either lands in
    /// the registry before shutdown drains it or is rejected here; it can
    /// never slip in after the drain and leak.
    async fn adopt(&self, id: ContainerId) -> bool {
        let record = ContainerRecord::new(id.clone());
        let since = record.last_used;
        let record_arc = Arc::new(Mutex::new(record));

        {
            let mut records = self.inner.records.lock().await;
            if self.inner.shutting_down.load(Ordering::SeqCst) {
                return false;
            }
            records.insert(id, record_arc.clone());
            self.inner.live.fetch_add(1, Ordering::SeqCst);
        }

        self.inner.free.lock().await.push(FreeEntry {
            record: record_arc,
            since,
        });

        self.inner.released.notify_one();
        true
    }

    /// Spawns provisioning tasks until live + in-flight reaches the target.
    async fn maybe_replenish(&self) {
        if self.inner.shutting_down.load(Ordering::SeqCst) {
            return;
        }

        let live = self.inner.live.load(Ordering::SeqCst);
        let in_flight = self.inner.provisions_in_flight.load(Ordering::SeqCst);
        let deficit = self
            .inner
            .config
            .target_size
            .saturating_sub(live + in_flight);

        if deficit == 0 {
            return;
        }

        for _ in 0..deficit {
            self.inner.provisions_in_flight.fetch_add(1, Ordering::SeqCst);

            let pool = self.clone();
            tokio::spawn(async move {
                let result = pool.provision_with_retry().await;
                pool.inner.provisions_in_flight.fetch_sub(1, Ordering::SeqCst);

                match result {
                    Ok(id) => {
                        if !pool.adopt(id.clone()).await {
                            // Shutdown won the race; clean up directly.
                            if let Err(e) = pool.inner.provisioner.destroy(&id).await {
                                tracing::error!(
                                    container = %id,
                                    error = %e,
                                    "destroy failed for container provisioned during shutdown"
                                );
                            }
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "replenishment gave up, pool stays under target");
                    }
                }
            });
        }
    }

    /// Provisions one container, retrying with exponential backoff until the
    /// attempt budget is spent.
    async fn provision_with_retry(&self) -> Result<ContainerId> {
        let config = &self.inner.config;
        let mut backoff = ExponentialBackoff::new(
            config.provision_backoff_initial,
            config.provision_backoff_max,
            config.provision_attempts,
        );

        loop {
            match self.inner.provisioner.provision(&self.inner.spec).await {
                Ok(id) => return Ok(id),
                Err(e) => {
                    tracing::warn!(
                        attempt = backoff.attempts_made() + 1,
                        max_attempts = config.provision_attempts,
                        error = %e,
                        "provisioning attempt failed"
                    );
                    match backoff.next_delay() {
                        Some(delay) => tokio::time::sleep(delay).await,
                        None => {
                            return Err(Error::ProvisionFailed {
                                attempts: config.provision_attempts,
                                reason: e.to_string(),
                            })
                        }
                    }
                }
            }
        }
    }

    /// Starts the background loop that reclaims containers with expired
    /// leases.
    fn spawn_reaper(&self) {
        let pool = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(pool.inner.config.reap_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                interval.tick().await;
                if pool.inner.shutting_down.load(Ordering::SeqCst) {
                    break;
                }
                pool.reap_expired_leases().await;
            }
        });
    }

    /// Retires every container whose lease deadline has passed.
    ///
    /// The owner may still be touching the container, so it is retired rather
    /// than returned to the pool; the owner's next call fails with
    /// `ContainerUnhealthy`.
    async fn reap_expired_leases(&self) {
        let records: Vec<Arc<Mutex<ContainerRecord>>> =
            { self.inner.records.lock().await.values().cloned().collect() };

        let mut expired = Vec::new();
        for record_arc in records {
            let record = record_arc.lock().await;
            if record.state == ContainerState::Leased {
                if let Some(lease) = &record.lease {
                    if lease.is_expired() {
                        expired.push((record.id.clone(), lease.owner.clone()));
                    }
                }
            }
        }

        for (id, owner) in expired {
            tracing::warn!(container = %id, owner = %owner, "lease expired");
            if let Err(e) = self.retire(&id, "lease expired").await {
                tracing::warn!(container = %id, error = %e, "failed to retire expired lease");
            }
        }
    }
}
