//! Completion barrier: block until every task of a job is terminal.
//!
//! This is a polling loop, not an event-driven wait. Each round lists the
//! job's tasks and either returns (nothing left non-terminal) or sleeps for
//! the poll interval. The deadline is the only way to stop it early and it
//! also bounds each listing call. The barrier never changes task state.

use std::time::Duration;

use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, info, warn};

use simscale_core::{CompletionState, JobHandle, TaskId, TaskSummary};

use crate::backend::TaskBackend;
use crate::config::{WaitConfig, DEFAULT_POLL_INTERVAL_MS};
use crate::error::OrchestratorError;

/// Final observation of a job whose tasks all reached a terminal state.
#[derive(Debug, Clone)]
pub struct CompletionReport {
    pub tasks: Vec<TaskSummary>,
    /// Completed with exit code 0, or with no exit code reported.
    pub succeeded: Vec<TaskId>,
    /// Completed with a non-zero exit code.
    pub failed: Vec<TaskId>,
    pub elapsed: Duration,
    pub polls: u32,
}

impl CompletionReport {
    fn new(tasks: Vec<TaskSummary>, elapsed: Duration, polls: u32) -> Self {
        let (failed, succeeded): (Vec<_>, Vec<_>) =
            tasks.iter().partition(|t| t.exited_with_failure());
        Self {
            succeeded: succeeded.into_iter().map(|t| t.id.clone()).collect(),
            failed: failed.into_iter().map(|t| t.id.clone()).collect(),
            tasks,
            elapsed,
            polls,
        }
    }
}

/// Polls a job until all its tasks are terminal or the deadline passes.
pub struct CompletionBarrier<'a, B: ?Sized> {
    backend: &'a B,
    poll_interval: Duration,
    require_success: bool,
}

impl<'a, B> CompletionBarrier<'a, B>
where
    B: TaskBackend + ?Sized,
{
    pub fn new(backend: &'a B) -> Self {
        Self {
            backend,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            require_success: false,
        }
    }

    pub fn from_config(backend: &'a B, wait: &WaitConfig) -> Self {
        Self::new(backend)
            .with_poll_interval(wait.poll_interval)
            .with_require_success(wait.require_success)
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Also fail when a completed task reports a non-zero exit code.
    pub fn with_require_success(mut self, require: bool) -> Self {
        self.require_success = require;
        self
    }

    /// Wait up to `timeout` for every task in `job` to complete.
    pub async fn await_all(
        &self,
        job: &JobHandle,
        timeout: Duration,
    ) -> Result<CompletionReport, OrchestratorError> {
        let started = Instant::now();
        let deadline = started + timeout;
        let mut polls = 0u32;
        let mut last: Vec<TaskSummary> = Vec::new();

        info!(
            job_id = %job.id,
            timeout = ?timeout,
            "Monitoring all tasks for 'Completed' state"
        );

        while Instant::now() < deadline {
            let tasks = match timeout_at(deadline, self.backend.list_tasks(&job.id)).await {
                Ok(result) => result?,
                Err(_) => {
                    warn!(job_id = %job.id, poll = polls + 1, "Task listing outlived the deadline");
                    break;
                }
            };
            polls += 1;

            let pending = tasks.iter().filter(|t| !t.state.is_terminal()).count();
            if pending == 0 {
                // A listing that lands on the deadline no longer counts.
                if Instant::now() >= deadline {
                    last = tasks;
                    break;
                }
                let report = CompletionReport::new(tasks, started.elapsed(), polls);
                return self.finish(job, report);
            }
            debug!(
                job_id = %job.id,
                pending,
                total = tasks.len(),
                poll = polls,
                "Tasks still running"
            );
            last = tasks;

            let remaining = deadline.saturating_duration_since(Instant::now());
            sleep(self.poll_interval.min(remaining)).await;
        }

        let pending: Vec<TaskId> = last
            .iter()
            .filter(|t| CompletionState::classify(t.state, true) == CompletionState::TimedOut)
            .map(|t| t.id.clone())
            .collect();
        Err(OrchestratorError::Timeout {
            job_id: job.id.clone(),
            timeout,
            elapsed: started.elapsed(),
            pending,
        })
    }

    fn finish(
        &self,
        job: &JobHandle,
        report: CompletionReport,
    ) -> Result<CompletionReport, OrchestratorError> {
        for id in &report.failed {
            warn!(job_id = %job.id, task_id = %id, "Task completed with a non-zero exit code");
        }
        if self.require_success && !report.failed.is_empty() {
            return Err(OrchestratorError::TasksFailed {
                job_id: job.id.clone(),
                failed: report.failed,
            });
        }
        info!(
            job_id = %job.id,
            tasks = report.tasks.len(),
            failed = report.failed.len(),
            elapsed = ?report.elapsed,
            "All tasks reached the 'Completed' state"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fanout::TaskFanout;
    use crate::memory::{InMemoryBackend, Progression};
    use crate::testing::{context, seeded_job};
    use crate::{BackendError, OutputStream};
    use simscale_core::{JobId, OsFamily, PoolId, TaskSpec, TaskState};

    async fn job_with_tasks(backend: &InMemoryBackend, n: u32) -> JobHandle {
        let job = seeded_job(backend).await;
        let ctx = context(OsFamily::Linux, false);
        TaskFanout::new(backend, &ctx)
            .submit_replicas(&job, n, "python main.py", "src")
            .await;
        job
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_once_all_complete() {
        let backend = InMemoryBackend::with_progression(Progression::AdvanceOnList);
        let job = job_with_tasks(&backend, 3).await;

        let report = CompletionBarrier::new(&backend)
            .await_all(&job, Duration::from_secs(60))
            .await
            .unwrap();

        // Pending -> Running on the first poll, Running -> Completed on the second.
        assert_eq!(report.polls, 2);
        assert_eq!(report.succeeded.len(), 3);
        assert!(report.failed.is_empty());
        assert!(report.tasks.iter().all(|t| t.state == TaskState::Completed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_when_tasks_never_finish() {
        let backend = InMemoryBackend::new();
        let job = job_with_tasks(&backend, 2).await;
        backend.set_task_state(&job.id, &TaskId::new("job_number0_sweep"), TaskState::Completed);

        let err = CompletionBarrier::new(&backend)
            .await_all(&job, Duration::from_secs(5))
            .await
            .unwrap_err();

        match err {
            OrchestratorError::Timeout {
                timeout,
                elapsed,
                pending,
                ..
            } => {
                assert_eq!(timeout, Duration::from_secs(5));
                assert!(elapsed >= timeout);
                assert_eq!(pending, vec![TaskId::new("job_number1_sweep")]);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(backend.calls().list_tasks, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_timeout_fails_without_polling() {
        let backend = InMemoryBackend::new();
        let job = job_with_tasks(&backend, 1).await;

        let err = CompletionBarrier::new(&backend)
            .await_all(&job, Duration::ZERO)
            .await
            .unwrap_err();

        assert!(matches!(err, OrchestratorError::Timeout { .. }));
        assert_eq!(backend.calls().list_tasks, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nonzero_exit_is_success_by_default() {
        let backend = InMemoryBackend::with_progression(Progression::AdvanceOnList);
        let job = job_with_tasks(&backend, 2).await;
        backend.set_exit_code("job_number1_sweep", 3);

        let report = CompletionBarrier::new(&backend)
            .await_all(&job, Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(report.failed, vec![TaskId::new("job_number1_sweep")]);
        assert_eq!(report.succeeded, vec![TaskId::new("job_number0_sweep")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_require_success_fails_on_nonzero_exit() {
        let backend = InMemoryBackend::with_progression(Progression::AdvanceOnList);
        let job = job_with_tasks(&backend, 2).await;
        backend.set_exit_code("job_number0_sweep", 1);

        let err = CompletionBarrier::new(&backend)
            .with_require_success(true)
            .await_all(&job, Duration::from_secs(60))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            OrchestratorError::TasksFailed { ref failed, .. } if failed.len() == 1
        ));
    }

    /// Backend whose task listing takes `delay` before reporting every
    /// task completed.
    struct SlowListing {
        delay: Duration,
        tasks: Vec<TaskSummary>,
    }

    #[async_trait::async_trait]
    impl TaskBackend for SlowListing {
        async fn add_task(&self, _: &JobId, _: &TaskSpec) -> Result<(), BackendError> {
            Ok(())
        }

        async fn list_tasks(&self, _: &JobId) -> Result<Vec<TaskSummary>, BackendError> {
            sleep(self.delay).await;
            Ok(self.tasks.clone())
        }

        async fn task_output(
            &self,
            job_id: &JobId,
            task_id: &TaskId,
            path: &str,
        ) -> Result<OutputStream, BackendError> {
            Err(BackendError::NotFound(format!("{job_id}/{task_id}/{path}")))
        }
    }

    fn slow_listing(delay: Duration) -> (SlowListing, JobHandle) {
        let backend = SlowListing {
            delay,
            tasks: vec![TaskSummary::new(TaskId::new("job_number0_sweep"), TaskState::Completed)],
        };
        let job = JobHandle {
            id: JobId::new("sweep"),
            pool_id: PoolId::new("p"),
        };
        (backend, job)
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_listing_is_cut_off_at_deadline() {
        let (backend, job) = slow_listing(Duration::from_secs(3600));

        let err = CompletionBarrier::new(&backend)
            .await_all(&job, Duration::from_secs(5))
            .await
            .unwrap_err();

        match err {
            OrchestratorError::Timeout { elapsed, pending, .. } => {
                assert!(elapsed >= Duration::from_secs(5));
                assert!(elapsed < Duration::from_secs(6));
                assert!(pending.is_empty());
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_listing_landing_on_deadline_is_not_success() {
        let (backend, job) = slow_listing(Duration::from_secs(5));

        let result = CompletionBarrier::new(&backend)
            .await_all(&job, Duration::from_secs(5))
            .await;

        assert!(matches!(result, Err(OrchestratorError::Timeout { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_listing_within_deadline_succeeds() {
        let (backend, job) = slow_listing(Duration::from_secs(2));

        let report = CompletionBarrier::new(&backend)
            .await_all(&job, Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(report.polls, 1);
        assert!(report.elapsed >= Duration::from_secs(2));
        assert!(report.elapsed < Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_error_propagates() {
        let backend = InMemoryBackend::new();
        let job = JobHandle {
            id: JobId::new("gone"),
            pool_id: PoolId::new("p"),
        };

        let err = CompletionBarrier::new(&backend)
            .await_all(&job, Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            OrchestratorError::Backend(BackendError::NotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_job_completes_immediately() {
        let backend = InMemoryBackend::new();
        let job = seeded_job(&backend).await;

        let report = CompletionBarrier::new(&backend)
            .await_all(&job, Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(report.polls, 1);
        assert!(report.tasks.is_empty());
    }
}
