//! Local-process provisioning.
//!
//! "Containers" are working directories on the host; execution happens in a
//! plain shell. No isolation beyond a separate directory, but the full pool
//! lifecycle runs without a Docker daemon, which is what the test suite and
//! the no-Docker fallback need.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::pool::ContainerId;

use super::{ProvisionSpec, Provisioner};

/// Provisioner that creates per-container working directories on the host.
///
/// The container id is the directory path, which the local transport uses as
/// the working directory for executions.
#[derive(Clone)]
pub struct LocalProvisioner {
    /// Base directory for sandbox working directories.
    base_dir: PathBuf,
    /// Counter for generating unique directory names (shared across clones).
    counter: Arc<AtomicU64>,
}

impl LocalProvisioner {
    /// Creates a provisioner rooted at `base_dir`.
    ///
    /// The directory is created on first provision if it does not exist.
    pub fn new(base_dir: PathBuf) -> Self {
        Self {
            base_dir,
            counter: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Creates a provisioner rooted in the system temp directory.
    pub fn in_temp_dir() -> Self {
        Self::new(std::env::temp_dir().join("sandbox-host"))
    }

    fn generate_dir_name(&self) -> String {
        let id = self.counter.fetch_add(1, Ordering::SeqCst);
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        format!("box-{}-{}", timestamp, id)
    }
}

#[async_trait]
impl Provisioner for LocalProvisioner {
    async fn provision(&self, _spec: &ProvisionSpec) -> Result<ContainerId> {
        let dir = self.base_dir.join(self.generate_dir_name());

        tokio::fs::create_dir_all(&dir).await?;

        let id = dir
            .to_str()
            .ok_or_else(|| Error::Config(format!("non-UTF8 sandbox path: {}", dir.display())))?
            .to_string();

        tracing::info!(dir = %id, "provisioned local sandbox directory");

        Ok(ContainerId::new(id))
    }

    async fn destroy(&self, id: &ContainerId) -> Result<()> {
        match tokio::fs::remove_dir_all(id.as_str()).await {
            Ok(()) => {}
            // Already gone counts as destroyed.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        tracing::info!(dir = %id, "destroyed local sandbox directory");
        Ok(())
    }

    fn name(&self) -> &str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provision::ProvisionSpec;
    use tempfile::TempDir;

    #[tokio::test]
    async fn local_provisioner_creates_and_destroys_directories() {
        let base = TempDir::new().expect("failed to create temp dir");
        let provisioner = LocalProvisioner::new(base.path().to_path_buf());

        let id = provisioner
            .provision(&ProvisionSpec::new("unused"))
            .await
            .expect("provision failed");

        let path = PathBuf::from(id.as_str());
        assert!(path.is_dir());
        assert!(path.starts_with(base.path()));

        provisioner.destroy(&id).await.expect("destroy failed");
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn local_provisioner_destroy_is_idempotent() {
        let base = TempDir::new().expect("failed to create temp dir");
        let provisioner = LocalProvisioner::new(base.path().to_path_buf());

        let id = provisioner
            .provision(&ProvisionSpec::new("unused"))
            .await
            .expect("provision failed");

        provisioner.destroy(&id).await.expect("first destroy failed");
        provisioner
            .destroy(&id)
            .await
            .expect("second destroy should be idempotent");
    }

    #[tokio::test]
    async fn local_provisioner_generates_unique_directories() {
        let base = TempDir::new().expect("failed to create temp dir");
        let provisioner = LocalProvisioner::new(base.path().to_path_buf());

        let a = provisioner
            .provision(&ProvisionSpec::new("unused"))
            .await
            .unwrap();
        let b = provisioner
            .provision(&ProvisionSpec::new("unused"))
            .await
            .unwrap();

        assert_ne!(a, b);
    }

    #[test]
    fn local_provisioner_has_correct_name() {
        assert_eq!(LocalProvisioner::in_temp_dir().name(), "local");
    }
}
