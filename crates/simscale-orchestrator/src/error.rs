//! Orchestration errors.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use simscale_core::{CoreError, JobId, TaskId};

use crate::backend::BackendError;
use crate::config::ConfigError;
use crate::credentials::CredentialError;

/// Kind of resource a provisioning call was creating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Pool,
    Job,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pool => f.write_str("pool"),
            Self::Job => f.write_str("job"),
        }
    }
}

/// Errors surfaced by the orchestration components.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Missing or invalid settings, detected before any remote call.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// A descriptor violated its invariants.
    #[error("invalid descriptor: {0}")]
    Invalid(#[from] CoreError),

    /// Simulator credentials could not be resolved.
    #[error("credentials error: {0}")]
    Credentials(#[from] CredentialError),

    /// The backend rejected a pool or job creation.
    #[error("failed to create {resource} '{id}': {source}")]
    Provisioning {
        resource: ResourceKind,
        id: String,
        #[source]
        source: BackendError,
    },

    /// One or more task submissions failed. Tasks already submitted stay
    /// in the job.
    #[error("{} of {attempted} task submissions into job '{job_id}' failed", failures.len())]
    Submission {
        job_id: JobId,
        attempted: usize,
        failures: Vec<(TaskId, BackendError)>,
    },

    /// Tasks did not all reach a terminal state within the deadline.
    #[error(
        "{} task(s) in job '{job_id}' did not reach 'Completed' within {timeout:?} (waited {elapsed:?})",
        pending.len()
    )]
    Timeout {
        job_id: JobId,
        timeout: Duration,
        elapsed: Duration,
        pending: Vec<TaskId>,
    },

    /// Tasks completed with a non-zero exit code and success was required.
    #[error("{} task(s) in job '{job_id}' exited with a non-zero code", failed.len())]
    TasksFailed { job_id: JobId, failed: Vec<TaskId> },

    /// A single-resource deletion failed.
    #[error("failed to delete {resource} '{id}': {source}")]
    Teardown {
        resource: ResourceKind,
        id: String,
        #[source]
        source: BackendError,
    },

    /// Any other backend failure, propagated unmodified.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
}

impl OrchestratorError {
    /// True for the job-creation flavour of provisioning errors.
    pub fn is_job_creation(&self) -> bool {
        matches!(
            self,
            Self::Provisioning {
                resource: ResourceKind::Job,
                ..
            }
        )
    }
}
