//! Job descriptors.

use serde::{Deserialize, Serialize};

use crate::{CoreError, JobId, PoolId};

/// A job to create, bound to exactly one pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    pub id: JobId,
    pub pool_id: PoolId,
}

impl JobSpec {
    pub fn new(id: JobId, pool_id: PoolId) -> Self {
        Self { id, pool_id }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.id.as_str().trim().is_empty() {
            return Err(CoreError::InvalidJobSpec {
                job_id: self.id.to_string(),
                reason: "job id must not be empty".to_string(),
            });
        }
        if self.pool_id.as_str().trim().is_empty() {
            return Err(CoreError::InvalidJobSpec {
                job_id: self.id.to_string(),
                reason: "job must reference a pool".to_string(),
            });
        }
        Ok(())
    }
}

/// Handle to a created job.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobHandle {
    pub id: JobId,
    pub pool_id: PoolId,
}

/// A job as listed by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: JobId,
    pub pool_id: Option<PoolId>,
    /// Backend-specific state name (e.g. `active`, `terminating`).
    pub state: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_requires_pool() {
        let spec = JobSpec::new(JobId::new("Job-a"), PoolId::new(""));
        assert!(spec.validate().is_err());
        let spec = JobSpec::new(JobId::new("Job-a"), PoolId::new("p"));
        assert!(spec.validate().is_ok());
    }
}
