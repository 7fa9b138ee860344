//! Container records, leases, and the per-container state machine.

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier for a provisioned container.
///
/// Wraps whatever handle the provisioning backend returns (a docker container
/// name, a temp directory path, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerId(String);

impl ContainerId {
    /// Creates a container id from a backend handle.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the underlying backend handle.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of a pooled container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    /// In the pool, eligible for leasing.
    Idle,
    /// Exclusively held by one caller.
    Leased,
    /// No longer eligible for leases, pending destruction.
    Draining,
    /// Destroyed and removed from the backend. Terminal.
    Dead,
}

impl ContainerState {
    /// Returns whether moving to `next` is a legal transition.
    ///
    /// Legal paths: `Idle -> Leased -> {Idle, Draining}`, `Idle -> Draining`
    /// (shutdown), `Draining -> Dead`. Dead is terminal.
    pub fn can_transition(self, next: ContainerState) -> bool {
        use ContainerState::*;
        matches!(
            (self, next),
            (Idle, Leased) | (Leased, Idle) | (Leased, Draining) | (Idle, Draining) | (Draining, Dead)
        )
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ContainerState::Idle => "idle",
            ContainerState::Leased => "leased",
            ContainerState::Draining => "draining",
            ContainerState::Dead => "dead",
        };
        f.write_str(s)
    }
}

/// A time-bounded exclusive claim on a container by one caller.
#[derive(Debug, Clone)]
pub struct Lease {
    /// Unique lease identifier.
    pub id: Uuid,
    /// The leased container.
    pub container: ContainerId,
    /// Caller identity, for logs and diagnostics.
    pub owner: String,
    /// When the lease was granted.
    pub acquired_at: Instant,
    /// When the reaper may reclaim the container.
    pub deadline: Instant,
}

impl Lease {
    /// Creates a new lease for `container` held by `owner`, expiring after `ttl`.
    pub fn new(container: ContainerId, owner: impl Into<String>, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            id: Uuid::new_v4(),
            container,
            owner: owner.into(),
            acquired_at: now,
            deadline: now + ttl,
        }
    }

    /// Returns whether the lease deadline has passed.
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

/// Bookkeeping for one pooled container.
///
/// Owned exclusively by the pool manager; mutated only through
/// lease/release/retire operations, each under the record's lock.
#[derive(Debug)]
pub struct ContainerRecord {
    /// Backend identifier.
    pub id: ContainerId,
    /// Current lifecycle state.
    pub state: ContainerState,
    /// When the container was provisioned.
    pub created_at: Instant,
    /// When the container was last released (or provisioned).
    pub last_used: Instant,
    /// The active lease, present exactly when state is Leased.
    pub lease: Option<Lease>,
}

impl ContainerRecord {
    /// Creates a fresh Idle record for a newly provisioned container.
    pub fn new(id: ContainerId) -> Self {
        let now = Instant::now();
        Self {
            id,
            state: ContainerState::Idle,
            created_at: now,
            last_used: now,
            lease: None,
        }
    }

    /// Moves the record to `next` if the transition is legal.
    ///
    /// Returns false and leaves the record untouched otherwise.
    pub fn transition(&mut self, next: ContainerState) -> bool {
        if !self.state.can_transition(next) {
            return false;
        }
        self.state = next;
        if next != ContainerState::Leased {
            self.lease = None;
        }
        if next == ContainerState::Idle {
            self.last_used = Instant::now();
        }
        true
    }

    /// Returns how long the container has been idle.
    pub fn idle_duration(&self) -> Duration {
        self.last_used.elapsed()
    }

    /// Returns the container's age since provisioning.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

/// Serializable snapshot of a container record, for logs and status output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerSummary {
    pub id: ContainerId,
    pub state: ContainerState,
    pub age_secs: f64,
    pub idle_secs: f64,
    pub lease_owner: Option<String>,
}

impl From<&ContainerRecord> for ContainerSummary {
    fn from(record: &ContainerRecord) -> Self {
        Self {
            id: record.id.clone(),
            state: record.state,
            age_secs: record.age().as_secs_f64(),
            idle_secs: record.idle_duration().as_secs_f64(),
            lease_owner: record.lease.as_ref().map(|l| l.owner.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_record_is_idle_with_no_lease() {
        let record = ContainerRecord::new(ContainerId::new("box-0"));

        assert_eq!(record.state, ContainerState::Idle);
        assert!(record.lease.is_none());
    }

    #[test]
    fn lease_and_release_round_trip() {
        let mut record = ContainerRecord::new(ContainerId::new("box-0"));

        assert!(record.transition(ContainerState::Leased));
        record.lease = Some(Lease::new(
            record.id.clone(),
            "caller-1",
            Duration::from_secs(60),
        ));

        assert!(record.transition(ContainerState::Idle));
        assert!(record.lease.is_none(), "release must clear the lease");
    }

    #[test]
    fn dead_is_terminal() {
        let mut record = ContainerRecord::new(ContainerId::new("box-0"));
        assert!(record.transition(ContainerState::Draining));
        assert!(record.transition(ContainerState::Dead));

        assert!(!record.transition(ContainerState::Idle));
        assert!(!record.transition(ContainerState::Leased));
        assert!(!record.transition(ContainerState::Draining));
        assert_eq!(record.state, ContainerState::Dead);
    }

    #[test]
    fn draining_cannot_be_leased() {
        let mut record = ContainerRecord::new(ContainerId::new("box-0"));
        assert!(record.transition(ContainerState::Draining));

        assert!(!record.transition(ContainerState::Leased));
        assert_eq!(record.state, ContainerState::Draining);
    }

    #[test]
    fn idle_cannot_jump_straight_to_dead() {
        let mut record = ContainerRecord::new(ContainerId::new("box-0"));
        assert!(!record.transition(ContainerState::Dead));
    }

    #[test]
    fn release_refreshes_last_used() {
        let mut record = ContainerRecord::new(ContainerId::new("box-0"));
        let before = record.last_used;

        std::thread::sleep(Duration::from_millis(5));
        record.transition(ContainerState::Leased);
        record.transition(ContainerState::Idle);

        assert!(record.last_used > before);
    }

    #[test]
    fn lease_expiry_respects_ttl() {
        let lease = Lease::new(ContainerId::new("box-0"), "caller", Duration::from_secs(60));
        assert!(!lease.is_expired());

        let expired = Lease::new(ContainerId::new("box-0"), "caller", Duration::ZERO);
        assert!(expired.is_expired());
    }

    #[test]
    fn summary_captures_lease_owner() {
        let mut record = ContainerRecord::new(ContainerId::new("box-7"));
        record.transition(ContainerState::Leased);
        record.lease = Some(Lease::new(
            record.id.clone(),
            "worker-3",
            Duration::from_secs(60),
        ));

        let summary = ContainerSummary::from(&record);
        assert_eq!(summary.state, ContainerState::Leased);
        assert_eq!(summary.lease_owner.as_deref(), Some("worker-3"));

        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("box-7"));
        assert!(json.contains("leased"));
    }
}
