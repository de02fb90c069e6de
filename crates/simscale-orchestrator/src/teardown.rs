//! Resource teardown.

use tracing::{info, warn};

use simscale_core::{JobId, PoolId};

use crate::backend::{BackendError, JobBackend, PoolBackend};
use crate::error::{OrchestratorError, ResourceKind};

/// Result of deleting one job during a bulk teardown.
#[derive(Debug, Clone)]
pub struct TeardownOutcome {
    pub job_id: JobId,
    pub result: Result<(), BackendError>,
}

impl TeardownOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Deletes jobs and pools.
pub struct TeardownManager<'a, B: ?Sized> {
    backend: &'a B,
}

impl<'a, B> TeardownManager<'a, B>
where
    B: PoolBackend + JobBackend + ?Sized,
{
    pub fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    /// Delete every job in `job_ids`, in order. Individual failures (for
    /// example a job that is already gone) are logged and recorded; the
    /// remaining ids are still attempted.
    pub async fn delete_all(&self, job_ids: &[JobId]) -> Vec<TeardownOutcome> {
        let mut outcomes = Vec::with_capacity(job_ids.len());
        for job_id in job_ids {
            let result = self.backend.delete_job(job_id).await;
            match &result {
                Ok(()) => info!(job_id = %job_id, "Deleted job"),
                Err(e) => warn!(job_id = %job_id, error = %e, "Job deletion failed, continuing"),
            }
            outcomes.push(TeardownOutcome {
                job_id: job_id.clone(),
                result,
            });
        }
        outcomes
    }

    /// Delete every job the backend knows about.
    pub async fn delete_all_jobs(&self) -> Result<Vec<TeardownOutcome>, OrchestratorError> {
        let ids: Vec<JobId> = self
            .backend
            .list_jobs()
            .await?
            .into_iter()
            .map(|job| job.id)
            .collect();
        info!(jobs = ids.len(), "Deleting all jobs");
        Ok(self.delete_all(&ids).await)
    }

    /// Delete one job; failure surfaces to the caller.
    pub async fn delete_job(&self, job_id: &JobId) -> Result<(), OrchestratorError> {
        info!(job_id = %job_id, "Deleting job");
        self.backend
            .delete_job(job_id)
            .await
            .map_err(|source| OrchestratorError::Teardown {
                resource: ResourceKind::Job,
                id: job_id.to_string(),
                source,
            })
    }

    /// Delete a pool; failure surfaces to the caller.
    pub async fn delete_pool(&self, pool_id: &PoolId) -> Result<(), OrchestratorError> {
        info!(pool_id = %pool_id, "Deleting pool");
        self.backend
            .delete_pool(pool_id)
            .await
            .map_err(|source| OrchestratorError::Teardown {
                resource: ResourceKind::Pool,
                id: pool_id.to_string(),
                source,
            })
    }
}
