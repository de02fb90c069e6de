//! Collect task output files (e.g. `stdout.txt`) from every task of a job.

use futures_util::TryStreamExt;
use tracing::{info, warn};

use simscale_core::{JobId, NodeId, TaskId};

use crate::backend::{BackendError, TaskBackend};
use crate::error::OrchestratorError;

/// Default file read from each task directory.
pub const DEFAULT_OUTPUT_FILE: &str = "stdout.txt";

/// Output of one task.
#[derive(Debug, Clone)]
pub struct TaskOutput {
    pub task_id: TaskId,
    pub node_id: Option<NodeId>,
    /// Decoded file content, or why it could not be read.
    pub text: Result<String, BackendError>,
}

/// Reads an output file from every task in a job.
pub struct OutputCollector<'a, B: ?Sized> {
    backend: &'a B,
}

impl<'a, B> OutputCollector<'a, B>
where
    B: TaskBackend + ?Sized,
{
    pub fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    /// Read `path` from each task. Listing the job's tasks must succeed;
    /// a per-task read failure is recorded for that task only.
    pub async fn collect(
        &self,
        job_id: &JobId,
        path: &str,
    ) -> Result<Vec<TaskOutput>, OrchestratorError> {
        let tasks = self.backend.list_tasks(job_id).await?;
        let mut outputs = Vec::with_capacity(tasks.len());

        for task in tasks {
            info!(
                task_id = %task.id,
                node_id = task.node_id.as_ref().map(NodeId::as_str).unwrap_or("-"),
                "Reading task output"
            );
            let text = self.read(job_id, &task.id, path).await;
            if let Err(e) = &text {
                warn!(task_id = %task.id, path, error = %e, "Could not read task output");
            }
            outputs.push(TaskOutput {
                task_id: task.id,
                node_id: task.node_id,
                text,
            });
        }

        Ok(outputs)
    }

    async fn read(
        &self,
        job_id: &JobId,
        task_id: &TaskId,
        path: &str,
    ) -> Result<String, BackendError> {
        let stream = self.backend.task_output(job_id, task_id, path).await?;
        let bytes: Vec<u8> = stream
            .try_fold(Vec::new(), |mut buf, chunk| async move {
                buf.extend_from_slice(&chunk);
                Ok(buf)
            })
            .await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fanout::TaskFanout;
    use crate::memory::InMemoryBackend;
    use crate::testing::{context, seeded_job};
    use simscale_core::OsFamily;

    #[tokio::test]
    async fn test_collects_each_task_and_tolerates_missing_files() {
        let backend = InMemoryBackend::new();
        let job = seeded_job(&backend).await;
        let ctx = context(OsFamily::Linux, false);
        TaskFanout::new(&backend, &ctx)
            .submit_replicas(&job, 2, "python main.py", "src")
            .await;

        let long_line = "episode reward: 200.0 after 1000 iterations\n";
        backend.set_task_output(
            &job.id,
            &TaskId::new("job_number0_sweep"),
            DEFAULT_OUTPUT_FILE,
            long_line.as_bytes(),
        );

        let outputs = OutputCollector::new(&backend)
            .collect(&job.id, DEFAULT_OUTPUT_FILE)
            .await
            .unwrap();

        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[0].text.as_deref().unwrap(), long_line);
        assert!(matches!(outputs[1].text, Err(BackendError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_replaced() {
        let backend = InMemoryBackend::new();
        let job = seeded_job(&backend).await;
        let ctx = context(OsFamily::Linux, false);
        TaskFanout::new(&backend, &ctx)
            .submit_replicas(&job, 1, "c", "src")
            .await;
        backend.set_task_output(&job.id, &TaskId::new("job_number0_sweep"), "stderr.txt", &[0x66, 0xff]);

        let outputs = OutputCollector::new(&backend)
            .collect(&job.id, "stderr.txt")
            .await
            .unwrap();

        assert_eq!(outputs[0].text.as_deref().unwrap(), "f\u{fffd}");
    }
}
