//! Capabilities the orchestrator needs from a compute backend.
//!
//! The real compute/queue/storage service is an external collaborator.
//! Implementations live elsewhere (`simscale-client` for the HTTP service,
//! [`crate::memory::InMemoryBackend`] for tests and dry runs).

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use thiserror::Error;

use simscale_core::{
    JobHandle, JobId, JobSpec, JobSummary, NodeCounts, PoolHandle, PoolId, PoolSpec, TaskId,
    TaskSpec, TaskSummary,
};

/// Errors reported by a backend call.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// The referenced resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A resource with the same id already exists.
    #[error("already exists: {0}")]
    Conflict(String),

    /// The backend rejected the request.
    #[error("rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The request never got a usable answer.
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend answered with something we could not decode.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Byte stream of a task output file.
pub type OutputStream = BoxStream<'static, Result<Bytes, BackendError>>;

/// Pool lifecycle operations.
#[async_trait]
pub trait PoolBackend: Send + Sync {
    async fn pool_exists(&self, id: &PoolId) -> Result<bool, BackendError>;

    async fn create_pool(&self, spec: &PoolSpec) -> Result<PoolHandle, BackendError>;

    async fn delete_pool(&self, id: &PoolId) -> Result<(), BackendError>;

    async fn list_pools(&self) -> Result<Vec<PoolId>, BackendError>;

    async fn pool_node_counts(&self, id: &PoolId) -> Result<NodeCounts, BackendError>;
}

/// Job lifecycle operations.
#[async_trait]
pub trait JobBackend: Send + Sync {
    /// Fails with `NotFound` if the pool does not exist and `Conflict` if
    /// the job id is taken.
    async fn create_job(&self, spec: &JobSpec) -> Result<JobHandle, BackendError>;

    async fn delete_job(&self, id: &JobId) -> Result<(), BackendError>;

    async fn list_jobs(&self) -> Result<Vec<JobSummary>, BackendError>;
}

/// Task operations within a job.
#[async_trait]
pub trait TaskBackend: Send + Sync {
    async fn add_task(&self, job_id: &JobId, spec: &TaskSpec) -> Result<(), BackendError>;

    async fn list_tasks(&self, job_id: &JobId) -> Result<Vec<TaskSummary>, BackendError>;

    /// Stream a file from the task's directory on its node (e.g. `stdout.txt`).
    async fn task_output(
        &self,
        job_id: &JobId,
        task_id: &TaskId,
        path: &str,
    ) -> Result<OutputStream, BackendError>;
}

/// Everything a campaign needs.
pub trait ComputeBackend: PoolBackend + JobBackend + TaskBackend {}

impl<T: PoolBackend + JobBackend + TaskBackend + ?Sized> ComputeBackend for T {}
