//! Pool and job provisioning.
//!
//! `ensure_pool` with `reuse_if_exists` is an existence check followed by a
//! create. Nothing on the client side serialises concurrent runs targeting
//! the same pool id: two of them can both observe "absent" and both try to
//! create it. The backend rejects the duplicate, which then surfaces as a
//! provisioning error for the slower run.

use tracing::{info, warn};

use simscale_core::{JobHandle, JobSpec, PoolHandle, PoolSpec};

use crate::backend::{JobBackend, PoolBackend};
use crate::error::{OrchestratorError, ResourceKind};

/// Creates or reuses pools and creates jobs bound to them.
pub struct ResourceProvisioner<'a, B: ?Sized> {
    backend: &'a B,
}

impl<'a, B> ResourceProvisioner<'a, B>
where
    B: PoolBackend + JobBackend + ?Sized,
{
    pub fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    /// Make sure a pool with `spec.id` exists.
    ///
    /// With `reuse_if_exists`, an existing pool is returned untouched (its
    /// definition is not compared against `spec`). Otherwise the full
    /// definition is submitted, and a duplicate id is a provisioning error.
    pub async fn ensure_pool(
        &self,
        spec: &PoolSpec,
        reuse_if_exists: bool,
    ) -> Result<PoolHandle, OrchestratorError> {
        spec.validate()?;

        let provisioning = |source| OrchestratorError::Provisioning {
            resource: ResourceKind::Pool,
            id: spec.id.to_string(),
            source,
        };

        if reuse_if_exists && self.backend.pool_exists(&spec.id).await.map_err(provisioning)? {
            warn!(pool_id = %spec.id, "Pool exists, re-using");
            return Ok(PoolHandle::new(spec.id.clone()));
        }

        warn!(
            pool_id = %spec.id,
            vm_size = %spec.vm_size,
            dedicated = spec.target.dedicated,
            low_priority = spec.target.low_priority,
            max_tasks_per_node = spec.max_tasks_per_node,
            "Creating new pool"
        );
        if let Some(mount) = &spec.mount {
            info!(
                account = %mount.account_name,
                url = %mount.url,
                mount_path = %mount.relative_mount_path,
                key = %mount.account_key.fingerprint(),
                "Using file share mount"
            );
        }

        self.backend.create_pool(spec).await.map_err(provisioning)
    }

    /// Create a job bound to an existing pool.
    pub async fn create_job(&self, spec: &JobSpec) -> Result<JobHandle, OrchestratorError> {
        spec.validate()?;

        info!(job_id = %spec.id, pool_id = %spec.pool_id, "Adding job to pool");
        self.backend
            .create_job(spec)
            .await
            .map_err(|source| OrchestratorError::Provisioning {
                resource: ResourceKind::Job,
                id: spec.id.to_string(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{CallCounts, InMemoryBackend};
    use crate::testing::pool_spec;
    use crate::BackendError;
    use simscale_core::{JobId, PoolId};

    #[tokio::test]
    async fn test_ensure_pool_twice_creates_once() {
        let backend = InMemoryBackend::new();
        let provisioner = ResourceProvisioner::new(&backend);
        let spec = pool_spec("simpool10");

        let first = provisioner.ensure_pool(&spec, true).await.unwrap();
        let second = provisioner.ensure_pool(&spec, true).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(backend.calls().create_pool, 1);
        assert_eq!(backend.calls().pool_exists, 2);
    }

    #[tokio::test]
    async fn test_reuse_leaves_existing_pool_untouched() {
        let backend = InMemoryBackend::new();
        let existing = pool_spec("shared");
        backend.seed_pool(existing.clone());

        let mut requested = pool_spec("shared");
        requested.vm_size = "Standard_E64s_v3".to_string();
        ResourceProvisioner::new(&backend)
            .ensure_pool(&requested, true)
            .await
            .unwrap();

        assert_eq!(backend.calls().create_pool, 0);
        assert_eq!(backend.pool_spec(&existing.id), Some(existing));
    }

    #[tokio::test]
    async fn test_no_reuse_surfaces_conflict() {
        let backend = InMemoryBackend::new();
        backend.seed_pool(pool_spec("taken"));

        let err = ResourceProvisioner::new(&backend)
            .ensure_pool(&pool_spec("taken"), false)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            OrchestratorError::Provisioning {
                resource: ResourceKind::Pool,
                source: BackendError::Conflict(_),
                ..
            }
        ));
        assert_eq!(backend.calls().pool_exists, 0);
    }

    #[tokio::test]
    async fn test_invalid_spec_never_reaches_backend() {
        let backend = InMemoryBackend::new();
        let mut spec = pool_spec("bad");
        spec.max_tasks_per_node = 0;

        let err = ResourceProvisioner::new(&backend)
            .ensure_pool(&spec, true)
            .await
            .unwrap_err();

        assert!(matches!(err, OrchestratorError::Invalid(_)));
        assert_eq!(backend.calls(), CallCounts::default());
    }

    #[tokio::test]
    async fn test_create_job_requires_pool() {
        let backend = InMemoryBackend::new();
        let provisioner = ResourceProvisioner::new(&backend);

        let spec = JobSpec::new(JobId::new("Job-x"), PoolId::new("missing"));
        let err = provisioner.create_job(&spec).await.unwrap_err();
        assert!(err.is_job_creation());
    }

    #[tokio::test]
    async fn test_create_job_rejects_duplicate_id() {
        let backend = InMemoryBackend::new();
        let provisioner = ResourceProvisioner::new(&backend);
        let pool = provisioner.ensure_pool(&pool_spec("p"), true).await.unwrap();

        let spec = JobSpec::new(JobId::new("Job-x"), pool.id.clone());
        let job = provisioner.create_job(&spec).await.unwrap();
        assert_eq!(job.pool_id, pool.id);

        let err = provisioner.create_job(&spec).await.unwrap_err();
        assert!(err.is_job_creation());
    }
}
