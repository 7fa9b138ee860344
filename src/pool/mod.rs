//! Container pool: records, leases, and the pool manager.

mod manager;
mod record;

pub use manager::{ContainerHandle, ContainerPool};
pub use record::{ContainerId, ContainerRecord, ContainerState, ContainerSummary, Lease};
