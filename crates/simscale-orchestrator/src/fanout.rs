//! Replica fan-out: one isolated task per simulation replica.

use std::ops::Range;

use tracing::{debug, error, info};

use simscale_core::{ContainerSettings, JobHandle, JobId, TaskHandle, TaskId, TaskSpec};

use crate::backend::{BackendError, TaskBackend};
use crate::context::OrchestrationContext;
use crate::error::OrchestratorError;

/// A task whose submission the backend refused.
#[derive(Debug, Clone)]
pub struct SubmissionFailure {
    pub index: u32,
    pub task_id: TaskId,
    pub error: BackendError,
}

/// Outcome of a fan-out. Submissions are independent, so a report can
/// hold both submitted tasks and failures.
#[derive(Debug, Clone)]
pub struct FanoutReport {
    pub job_id: JobId,
    pub submitted: Vec<TaskHandle>,
    pub failed: Vec<SubmissionFailure>,
}

impl FanoutReport {
    fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            submitted: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn attempted(&self) -> usize {
        self.submitted.len() + self.failed.len()
    }

    /// The submitted handles, or a `Submission` error listing every failure.
    pub fn into_result(self) -> Result<Vec<TaskHandle>, OrchestratorError> {
        if self.failed.is_empty() {
            return Ok(self.submitted);
        }
        Err(OrchestratorError::Submission {
            attempted: self.attempted(),
            job_id: self.job_id,
            failures: self
                .failed
                .into_iter()
                .map(|f| (f.task_id, f.error))
                .collect(),
        })
    }
}

/// Submits replica tasks into a job.
pub struct TaskFanout<'a, B: ?Sized> {
    backend: &'a B,
    ctx: &'a OrchestrationContext,
}

impl<'a, B> TaskFanout<'a, B>
where
    B: TaskBackend + ?Sized,
{
    pub fn new(backend: &'a B, ctx: &'a OrchestrationContext) -> Self {
        Self { backend, ctx }
    }

    /// Build the spec of replica `index`.
    pub fn build_task(&self, index: u32, command: &str, workdir: &str) -> TaskSpec {
        let run_options = self
            .ctx
            .os_family()
            .container_run_options(workdir, self.ctx.shared_mount());
        let container = ContainerSettings {
            image: self.ctx.image().to_string(),
            run_options,
        };
        TaskSpec::new(TaskId::replica(index, self.ctx.campaign()), command, container)
            .with_credentials(self.ctx.credentials())
    }

    /// Submit replicas `0..count`.
    pub async fn submit_replicas(
        &self,
        job: &JobHandle,
        count: u32,
        command: &str,
        workdir: &str,
    ) -> FanoutReport {
        self.submit_range(job, 0..count, command, workdir).await
    }

    /// Submit the replicas in `indices`, in order.
    ///
    /// A failed submission is recorded and the next replica is attempted;
    /// already-submitted tasks are never rolled back. Resubmitting with a
    /// disjoint range is safe since ids derive from the index.
    pub async fn submit_range(
        &self,
        job: &JobHandle,
        indices: Range<u32>,
        command: &str,
        workdir: &str,
    ) -> FanoutReport {
        let mut report = FanoutReport::new(job.id.clone());

        info!(
            job_id = %job.id,
            pool_id = %job.pool_id,
            replicas = indices.len(),
            first = indices.start,
            "Submitting replica tasks"
        );

        for index in indices {
            let spec = self.build_task(index, command, workdir);
            debug!(
                task_id = %spec.id,
                command = %spec.command_line,
                run_options = %spec.container.run_options,
                workspace = %self.ctx.credentials().workspace,
                access_key = %self.ctx.credentials().access_key.fingerprint(),
                "Submitting task"
            );

            match self.backend.add_task(&job.id, &spec).await {
                Ok(()) => report.submitted.push(TaskHandle {
                    job_id: job.id.clone(),
                    task_id: spec.id,
                }),
                Err(e) => {
                    error!(task_id = %spec.id, error = %e, "Task submission failed");
                    report.failed.push(SubmissionFailure {
                        index,
                        task_id: spec.id,
                        error: e,
                    });
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBackend;
    use crate::testing::{context, seeded_job};
    use simscale_core::{OsFamily, Secret};

    #[tokio::test]
    async fn test_submits_exactly_n_unique_tasks() {
        let backend = InMemoryBackend::new();
        let job = seeded_job(&backend).await;
        let ctx = context(OsFamily::Linux, false);

        let report = TaskFanout::new(&backend, &ctx)
            .submit_replicas(&job, 5, "python main.py", "src")
            .await;

        assert!(report.is_complete());
        assert_eq!(report.submitted.len(), 5);
        let ids: Vec<String> = backend
            .submitted_tasks(&job.id)
            .iter()
            .map(|t| t.id.to_string())
            .collect();
        assert_eq!(
            ids,
            vec![
                "job_number0_sweep",
                "job_number1_sweep",
                "job_number2_sweep",
                "job_number3_sweep",
                "job_number4_sweep",
            ]
        );
    }

    #[tokio::test]
    async fn test_task_carries_isolation_and_credentials() {
        let backend = InMemoryBackend::new();
        let ctx = context(OsFamily::Linux, true);
        let spec = TaskFanout::new(&backend, &ctx).build_task(3, "python run.py", "sim");

        assert_eq!(spec.id.as_str(), "job_number3_sweep");
        assert_eq!(spec.command_line, "python run.py");
        assert_eq!(spec.container.image, "reg.io/sim:1");
        assert_eq!(
            spec.container.run_options,
            "--workdir /sim/ --volume /azfileshare/:/sim/logs"
        );
        assert_eq!(spec.env("SIM_WORKSPACE").map(Secret::expose), Some("ws-1"));
        assert_eq!(spec.env("SIM_ACCESS_KEY").map(Secret::expose), Some("key-1"));
    }

    #[tokio::test]
    async fn test_windows_without_mount() {
        let backend = InMemoryBackend::new();
        let ctx = context(OsFamily::Windows, false);
        let spec = TaskFanout::new(&backend, &ctx).build_task(0, "python main.py", "src");
        assert_eq!(spec.container.run_options, "-w C:\\src\\");
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_fanout() {
        let backend = InMemoryBackend::new();
        let job = seeded_job(&backend).await;
        let ctx = context(OsFamily::Linux, false);
        backend.fail_task("job_number1_sweep");

        let report = TaskFanout::new(&backend, &ctx)
            .submit_replicas(&job, 3, "python main.py", "src")
            .await;

        assert_eq!(backend.calls().add_task, 3);
        assert_eq!(report.submitted.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].index, 1);
        assert_eq!(backend.submitted_tasks(&job.id).len(), 2);

        let err = report.into_result().unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::Submission { attempted: 3, ref failures, .. } if failures.len() == 1
        ));
    }

    #[tokio::test]
    async fn test_resubmit_disjoint_range() {
        let backend = InMemoryBackend::new();
        let job = seeded_job(&backend).await;
        let ctx = context(OsFamily::Linux, false);
        let fanout = TaskFanout::new(&backend, &ctx);

        assert!(fanout.submit_replicas(&job, 2, "c", "src").await.is_complete());
        let more = fanout.submit_range(&job, 2..4, "c", "src").await;

        assert!(more.is_complete());
        assert_eq!(more.submitted[0].task_id.as_str(), "job_number2_sweep");
        assert_eq!(backend.submitted_tasks(&job.id).len(), 4);
    }

    #[tokio::test]
    async fn test_overlapping_range_conflicts() {
        let backend = InMemoryBackend::new();
        let job = seeded_job(&backend).await;
        let ctx = context(OsFamily::Linux, false);
        let fanout = TaskFanout::new(&backend, &ctx);

        fanout.submit_replicas(&job, 2, "c", "src").await;
        let again = fanout.submit_range(&job, 1..3, "c", "src").await;

        assert_eq!(again.failed.len(), 1);
        assert!(matches!(again.failed[0].error, BackendError::Conflict(_)));
    }
}
