//! End-to-end campaign run: size, provision, fan out, optionally wait.

use chrono::Local;
use tracing::{info, warn};

use simscale_core::{Credentials, JobHandle, JobId, JobSpec, PoolHandle, SizingRecommendation};

use crate::backend::ComputeBackend;
use crate::barrier::{CompletionBarrier, CompletionReport};
use crate::config::CampaignConfig;
use crate::context::OrchestrationContext;
use crate::error::OrchestratorError;
use crate::fanout::{FanoutReport, TaskFanout};
use crate::provisioner::ResourceProvisioner;

/// What a campaign run produced.
#[derive(Debug, Clone)]
pub struct CampaignReport {
    pub pool: PoolHandle,
    pub job: JobHandle,
    pub sizing: SizingRecommendation,
    /// May contain failures; submitted tasks are kept either way.
    pub fanout: FanoutReport,
    /// Present when the run waited for completion.
    pub completion: Option<CompletionReport>,
}

/// One campaign against a backend.
pub struct Campaign<'a, B: ?Sized> {
    backend: &'a B,
    config: &'a CampaignConfig,
    ctx: OrchestrationContext,
}

impl<'a, B> Campaign<'a, B>
where
    B: ComputeBackend + ?Sized,
{
    pub fn new(backend: &'a B, config: &'a CampaignConfig, credentials: Credentials) -> Self {
        Self {
            backend,
            ctx: OrchestrationContext::for_campaign(config, credentials),
            config,
        }
    }

    pub fn context(&self) -> &OrchestrationContext {
        &self.ctx
    }

    /// Job id used by the next run: the configured one, or a fresh
    /// timestamped id.
    pub fn job_id(&self) -> JobId {
        self.config
            .job_id
            .clone()
            .unwrap_or_else(|| JobId::timestamped(&self.config.campaign, &Local::now()))
    }

    /// Run the campaign.
    ///
    /// The pool is reused when it already exists. Submission failures do
    /// not stop the run; they are reported in [`CampaignReport::fanout`]
    /// and the barrier, if configured, waits on the tasks that were
    /// accepted.
    pub async fn run(&self) -> Result<CampaignReport, OrchestratorError> {
        let config = self.config;
        let sizing = config.sizing;

        info!(
            campaign = %config.campaign,
            replicas = config.replicas,
            nodes = config.pool.target.total(),
            tasks_per_node = sizing.tasks_per_node,
            vm_size = %config.pool.vm_size,
            "Starting campaign"
        );
        if sizing.density_warning {
            warn!(
                tasks_per_node = sizing.tasks_per_node,
                vm_size = sizing.vm_size(),
                "Task density exceeds what the largest VM size is rated for, consider more nodes"
            );
        }

        let provisioner = ResourceProvisioner::new(self.backend);
        let pool = provisioner.ensure_pool(&config.pool, true).await?;
        let job = provisioner
            .create_job(&JobSpec::new(self.job_id(), pool.id.clone()))
            .await?;

        let fanout = TaskFanout::new(self.backend, &self.ctx)
            .submit_replicas(&job, config.replicas, &config.command, &config.workdir)
            .await;
        if !fanout.is_complete() {
            warn!(
                job_id = %job.id,
                failed = fanout.failed.len(),
                submitted = fanout.submitted.len(),
                "Some replicas were not submitted"
            );
        }

        let completion = match &config.wait {
            Some(wait) => Some(
                CompletionBarrier::from_config(self.backend, wait)
                    .await_all(&job, wait.timeout)
                    .await?,
            ),
            None => None,
        };

        Ok(CampaignReport {
            pool,
            job,
            sizing,
            fanout,
            completion,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::WaitConfig;
    use crate::memory::{InMemoryBackend, Progression};
    use crate::testing::pool_spec;
    use simscale_core::{OsFamily, SizingPolicy, TaskState};

    fn config(replicas: u32, wait: Option<WaitConfig>) -> CampaignConfig {
        CampaignConfig {
            campaign: "sweep".to_string(),
            job_id: Some(JobId::new("Job-sweep-1")),
            replicas,
            command: "python main.py".to_string(),
            workdir: "src".to_string(),
            os_family: OsFamily::Linux,
            sizing: SizingPolicy.recommend(replicas, 1, 9).unwrap(),
            pool: pool_spec("simpool10"),
            wait,
        }
    }

    fn credentials() -> Credentials {
        Credentials::new("ws-1", "key-1")
    }

    #[tokio::test]
    async fn test_run_without_wait() {
        let backend = InMemoryBackend::new();
        let config = config(20, None);

        let report = Campaign::new(&backend, &config, credentials())
            .run()
            .await
            .unwrap();

        assert_eq!(report.pool.id.as_str(), "simpool10");
        assert_eq!(report.job.id.as_str(), "Job-sweep-1");
        assert_eq!(report.fanout.submitted.len(), 20);
        assert!(report.completion.is_none());
        assert_eq!(backend.calls().list_tasks, 0);
        assert_eq!(backend.submitted_tasks(&report.job.id).len(), 20);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_waits_for_completion() {
        let backend = InMemoryBackend::with_progression(Progression::AdvanceOnList);
        let config = config(
            4,
            Some(WaitConfig {
                timeout: Duration::from_secs(30),
                poll_interval: Duration::from_secs(1),
                require_success: false,
            }),
        );

        let report = Campaign::new(&backend, &config, credentials())
            .run()
            .await
            .unwrap();

        let completion = report.completion.unwrap();
        assert_eq!(completion.succeeded.len(), 4);
        assert!(completion
            .tasks
            .iter()
            .all(|t| t.state == TaskState::Completed));
    }

    #[tokio::test]
    async fn test_existing_pool_is_reused() {
        let backend = InMemoryBackend::new();
        backend.seed_pool(pool_spec("simpool10"));
        let config = config(2, None);

        Campaign::new(&backend, &config, credentials())
            .run()
            .await
            .unwrap();

        assert_eq!(backend.calls().create_pool, 0);
        assert_eq!(backend.calls().create_job, 1);
    }

    #[tokio::test]
    async fn test_partial_fanout_is_reported() {
        let backend = InMemoryBackend::new();
        backend.fail_task("job_number0_sweep");
        let config = config(3, None);

        let report = Campaign::new(&backend, &config, credentials())
            .run()
            .await
            .unwrap();

        assert!(!report.fanout.is_complete());
        assert_eq!(report.fanout.submitted.len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_job_id_fails_before_fanout() {
        let backend = InMemoryBackend::new();
        let config = config(2, None);
        let campaign = Campaign::new(&backend, &config, credentials());

        campaign.run().await.unwrap();
        let err = campaign.run().await.unwrap_err();

        assert!(err.is_job_creation());
        assert_eq!(backend.calls().add_task, 2);
    }

    #[test]
    fn test_timestamped_job_id_when_unset() {
        let backend = InMemoryBackend::new();
        let mut config = config(1, None);
        config.job_id = None;

        let id = Campaign::new(&backend, &config, credentials()).job_id();
        assert!(id.as_str().starts_with("Job-sweep-"));
    }
}
