//! In-process backend used for dry runs and tests.
//!
//! Keeps pools, jobs and tasks in memory, counts calls, and supports
//! fault injection. Task states only move forward when the backend is
//! told to (see [`Progression`]).

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream;

use simscale_core::{
    JobHandle, JobId, JobSpec, JobSummary, NodeCounts, NodeId, NodeStateCounts, PoolHandle, PoolId,
    PoolSpec, TaskId, TaskSpec, TaskState, TaskSummary,
};

use crate::backend::{BackendError, JobBackend, OutputStream, PoolBackend, TaskBackend};

/// How task states evolve between `list_tasks` calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Progression {
    /// States only change through [`InMemoryBackend::set_task_state`].
    #[default]
    Manual,
    /// Every `list_tasks` call advances each task by one state.
    AdvanceOnList,
}

/// Number of calls made against each operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub pool_exists: u32,
    pub create_pool: u32,
    pub delete_pool: u32,
    pub create_job: u32,
    pub delete_job: u32,
    pub add_task: u32,
    pub list_tasks: u32,
}

struct TaskRecord {
    spec: TaskSpec,
    state: TaskState,
    node_id: Option<NodeId>,
    exit_code: Option<i32>,
}

impl TaskRecord {
    fn summary(&self) -> TaskSummary {
        TaskSummary {
            id: self.spec.id.clone(),
            state: self.state,
            node_id: self.node_id.clone(),
            exit_code: self.exit_code,
        }
    }
}

struct JobRecord {
    pool_id: PoolId,
    tasks: Vec<TaskRecord>,
}

#[derive(Default)]
struct Inner {
    pools: BTreeMap<PoolId, PoolSpec>,
    jobs: BTreeMap<JobId, JobRecord>,
    outputs: HashMap<(JobId, TaskId, String), Vec<u8>>,
    exit_codes: HashMap<TaskId, i32>,
    failing_tasks: HashSet<TaskId>,
    failing_job_deletes: HashSet<JobId>,
    calls: CallCounts,
}

/// In-memory implementation of every backend capability.
#[derive(Default)]
pub struct InMemoryBackend {
    inner: Mutex<Inner>,
    progression: Progression,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_progression(progression: Progression) -> Self {
        Self {
            inner: Mutex::default(),
            progression,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, BackendError> {
        self.inner
            .lock()
            .map_err(|_| BackendError::Transport("in-memory backend poisoned".to_string()))
    }

    /// Register a pool without going through `create_pool`.
    pub fn seed_pool(&self, spec: PoolSpec) {
        if let Ok(mut inner) = self.lock() {
            inner.pools.insert(spec.id.clone(), spec);
        }
    }

    /// Make every `add_task` for `task_id` fail.
    pub fn fail_task(&self, task_id: impl Into<TaskId>) {
        if let Ok(mut inner) = self.lock() {
            inner.failing_tasks.insert(task_id.into());
        }
    }

    /// Make every `delete_job` for `job_id` fail.
    pub fn fail_job_delete(&self, job_id: impl Into<JobId>) {
        if let Ok(mut inner) = self.lock() {
            inner.failing_job_deletes.insert(job_id.into());
        }
    }

    /// Exit code reported once `task_id` completes (default 0).
    pub fn set_exit_code(&self, task_id: impl Into<TaskId>, code: i32) {
        if let Ok(mut inner) = self.lock() {
            inner.exit_codes.insert(task_id.into(), code);
        }
    }

    /// Force the state of a task.
    pub fn set_task_state(&self, job_id: &JobId, task_id: &TaskId, state: TaskState) {
        if let Ok(mut inner) = self.lock() {
            let code = inner.exit_codes.get(task_id).copied().unwrap_or(0);
            if let Some(task) = inner
                .jobs
                .get_mut(job_id)
                .and_then(|job| job.tasks.iter_mut().find(|t| &t.spec.id == task_id))
            {
                task.state = state;
                if state.is_terminal() {
                    task.exit_code = Some(code);
                }
            }
        }
    }

    /// Content served for a task output file.
    pub fn set_task_output(&self, job_id: &JobId, task_id: &TaskId, path: &str, content: &[u8]) {
        if let Ok(mut inner) = self.lock() {
            inner.outputs.insert(
                (job_id.clone(), task_id.clone(), path.to_string()),
                content.to_vec(),
            );
        }
    }

    pub fn calls(&self) -> CallCounts {
        self.lock().map(|inner| inner.calls).unwrap_or_default()
    }

    /// Specs of the tasks submitted to a job, in submission order.
    pub fn submitted_tasks(&self, job_id: &JobId) -> Vec<TaskSpec> {
        self.lock()
            .ok()
            .and_then(|inner| {
                inner
                    .jobs
                    .get(job_id)
                    .map(|job| job.tasks.iter().map(|t| t.spec.clone()).collect())
            })
            .unwrap_or_default()
    }

    pub fn pool_spec(&self, pool_id: &PoolId) -> Option<PoolSpec> {
        self.lock().ok()?.pools.get(pool_id).cloned()
    }

    pub fn has_job(&self, job_id: &JobId) -> bool {
        self.lock()
            .map(|inner| inner.jobs.contains_key(job_id))
            .unwrap_or(false)
    }
}

fn advance(inner: &mut Inner, job_id: &JobId) {
    let Inner {
        jobs,
        pools,
        exit_codes,
        ..
    } = inner;
    let Some(job) = jobs.get_mut(job_id) else {
        return;
    };
    let nodes = pools
        .get(&job.pool_id)
        .map(|p| p.target.total())
        .unwrap_or(1)
        .max(1);

    for (i, task) in job.tasks.iter_mut().enumerate() {
        match task.state {
            TaskState::Pending => {
                task.state = TaskState::Running;
                task.node_id = Some(NodeId::new(format!("tvm-{}", i as u32 % nodes)));
            }
            TaskState::Running => {
                task.state = TaskState::Completed;
                task.exit_code = Some(exit_codes.get(&task.spec.id).copied().unwrap_or(0));
            }
            TaskState::Completed => {}
        }
    }
}

#[async_trait]
impl PoolBackend for InMemoryBackend {
    async fn pool_exists(&self, id: &PoolId) -> Result<bool, BackendError> {
        let mut inner = self.lock()?;
        inner.calls.pool_exists += 1;
        Ok(inner.pools.contains_key(id))
    }

    async fn create_pool(&self, spec: &PoolSpec) -> Result<PoolHandle, BackendError> {
        let mut inner = self.lock()?;
        inner.calls.create_pool += 1;
        if inner.pools.contains_key(&spec.id) {
            return Err(BackendError::Conflict(format!("pool {}", spec.id)));
        }
        inner.pools.insert(spec.id.clone(), spec.clone());
        Ok(PoolHandle::new(spec.id.clone()))
    }

    async fn delete_pool(&self, id: &PoolId) -> Result<(), BackendError> {
        let mut inner = self.lock()?;
        inner.calls.delete_pool += 1;
        inner
            .pools
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| BackendError::NotFound(format!("pool {id}")))
    }

    async fn list_pools(&self) -> Result<Vec<PoolId>, BackendError> {
        Ok(self.lock()?.pools.keys().cloned().collect())
    }

    async fn pool_node_counts(&self, id: &PoolId) -> Result<NodeCounts, BackendError> {
        let inner = self.lock()?;
        let pool = inner
            .pools
            .get(id)
            .ok_or_else(|| BackendError::NotFound(format!("pool {id}")))?;
        let idle = |n: u32| NodeStateCounts {
            idle: n,
            total: n,
            ..Default::default()
        };
        Ok(NodeCounts {
            pool_id: id.clone(),
            dedicated: idle(pool.target.dedicated),
            low_priority: idle(pool.target.low_priority),
        })
    }
}

#[async_trait]
impl JobBackend for InMemoryBackend {
    async fn create_job(&self, spec: &JobSpec) -> Result<JobHandle, BackendError> {
        let mut inner = self.lock()?;
        inner.calls.create_job += 1;
        if !inner.pools.contains_key(&spec.pool_id) {
            return Err(BackendError::NotFound(format!("pool {}", spec.pool_id)));
        }
        if inner.jobs.contains_key(&spec.id) {
            return Err(BackendError::Conflict(format!("job {}", spec.id)));
        }
        inner.jobs.insert(
            spec.id.clone(),
            JobRecord {
                pool_id: spec.pool_id.clone(),
                tasks: Vec::new(),
            },
        );
        Ok(JobHandle {
            id: spec.id.clone(),
            pool_id: spec.pool_id.clone(),
        })
    }

    async fn delete_job(&self, id: &JobId) -> Result<(), BackendError> {
        let mut inner = self.lock()?;
        inner.calls.delete_job += 1;
        if inner.failing_job_deletes.contains(id) {
            return Err(BackendError::Rejected {
                status: 409,
                message: format!("job {id} is being deleted"),
            });
        }
        inner
            .jobs
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| BackendError::NotFound(format!("job {id}")))
    }

    async fn list_jobs(&self) -> Result<Vec<JobSummary>, BackendError> {
        Ok(self
            .lock()?
            .jobs
            .iter()
            .map(|(id, job)| JobSummary {
                id: id.clone(),
                pool_id: Some(job.pool_id.clone()),
                state: "active".to_string(),
            })
            .collect())
    }
}

#[async_trait]
impl TaskBackend for InMemoryBackend {
    async fn add_task(&self, job_id: &JobId, spec: &TaskSpec) -> Result<(), BackendError> {
        let mut inner = self.lock()?;
        inner.calls.add_task += 1;
        if inner.failing_tasks.contains(&spec.id) {
            return Err(BackendError::Rejected {
                status: 500,
                message: format!("injected failure for task {}", spec.id),
            });
        }
        let job = inner
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| BackendError::NotFound(format!("job {job_id}")))?;
        if job.tasks.iter().any(|t| t.spec.id == spec.id) {
            return Err(BackendError::Conflict(format!("task {}", spec.id)));
        }
        job.tasks.push(TaskRecord {
            spec: spec.clone(),
            state: TaskState::Pending,
            node_id: None,
            exit_code: None,
        });
        Ok(())
    }

    async fn list_tasks(&self, job_id: &JobId) -> Result<Vec<TaskSummary>, BackendError> {
        let mut inner = self.lock()?;
        inner.calls.list_tasks += 1;
        if !inner.jobs.contains_key(job_id) {
            return Err(BackendError::NotFound(format!("job {job_id}")));
        }
        if self.progression == Progression::AdvanceOnList {
            advance(&mut inner, job_id);
        }
        Ok(inner
            .jobs
            .get(job_id)
            .map(|job| job.tasks.iter().map(TaskRecord::summary).collect())
            .unwrap_or_default())
    }

    async fn task_output(
        &self,
        job_id: &JobId,
        task_id: &TaskId,
        path: &str,
    ) -> Result<OutputStream, BackendError> {
        let inner = self.lock()?;
        let content = inner
            .outputs
            .get(&(job_id.clone(), task_id.clone(), path.to_string()))
            .cloned()
            .ok_or_else(|| BackendError::NotFound(format!("{job_id}/{task_id}/{path}")))?;

        // Serve in small chunks so readers exercise reassembly.
        let chunks: Vec<Result<Bytes, BackendError>> = content
            .chunks(16)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        Ok(Box::pin(stream::iter(chunks)))
    }
}
