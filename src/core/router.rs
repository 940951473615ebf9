use crate::backend::{Backend, BackendSettings};
use crate::config::Config;
use crate::core::error::Result;
use crate::core::job::JobSpec;
use crate::core::quota::QuotaRegistry;
use crate::core::submission::SubmissionResult;
use crate::process::{ProcessRunner, SystemRunner};

/// Single entry point for submissions: quota, backend selection, delegation.
#[derive(Debug)]
pub struct Router<R> {
    quotas: QuotaRegistry,
    settings: BackendSettings,
    runner: R,
}

impl Router<SystemRunner> {
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.quota_registry(),
            BackendSettings::from(config),
            SystemRunner::new(config.runner.timeout()),
        )
    }
}

impl<R: ProcessRunner> Router<R> {
    pub fn new(quotas: QuotaRegistry, settings: BackendSettings, runner: R) -> Self {
        Self {
            quotas,
            settings,
            runner,
        }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Quota is checked before any backend is touched. Availability is
    /// checked before any backend work, dry runs included.
    #[tracing::instrument(skip_all, fields(team = %job.team(), category = %job.category(), dry_run = dry_run))]
    pub async fn submit(&self, job: &JobSpec, dry_run: bool) -> Result<SubmissionResult> {
        self.quotas.enforce(job.team(), job.gpus())?;

        let backend = Backend::for_category(job.category(), &self.runner, &self.settings);
        if !backend.is_available() {
            return Err(backend.unavailable_error());
        }

        tracing::info!(backend = %backend.kind(), gpus = job.gpus(), "Routing job");
        let result = backend.submit(job, dry_run).await?;
        tracing::info!(job_id = %result.job_id, start = %result.expected_start_time, "Submission complete");
        Ok(result)
    }

    /// The native artifact the job would be submitted as. Needs neither
    /// quota headroom nor the backend tool.
    pub fn render(&self, job: &JobSpec) -> Result<String> {
        Backend::for_category(job.category(), &self.runner, &self.settings).render(job)
    }
}
