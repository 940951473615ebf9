//! Execution backends.
//!
//! Exactly two variants exist: Slurm for training and Kubernetes for
//! inference and interactive work. Both render a native artifact from a
//! [`JobSpec`], submit it through a [`ProcessRunner`] and report a
//! [`SubmissionResult`].

pub mod kubernetes;
pub mod slurm;

use crate::config::Config;
use crate::core::error::{Result, SubmitError};
use crate::core::job::{JobCategory, JobSpec};
use crate::core::submission::{BackendKind, SubmissionResult};
use crate::process::ProcessRunner;

pub use kubernetes::{KubernetesBackend, KubernetesSettings};
pub use slurm::{SlurmBackend, SlurmSettings};

/// Tool and probe settings for both backends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendSettings {
    pub slurm: SlurmSettings,
    pub kubernetes: KubernetesSettings,
}

impl From<&Config> for BackendSettings {
    fn from(config: &Config) -> Self {
        Self {
            slurm: SlurmSettings {
                sbatch: config.tools.sbatch.clone(),
                squeue: config.tools.squeue.clone(),
                probe_attempts: config.probe.attempts,
                probe_interval: config.probe.interval(),
            },
            kubernetes: KubernetesSettings {
                kubectl: config.tools.kubectl.clone(),
            },
        }
    }
}

pub enum Backend<'a, R: ProcessRunner> {
    Slurm(SlurmBackend<'a, R>),
    Kubernetes(KubernetesBackend<'a, R>),
}

impl<'a, R: ProcessRunner> Backend<'a, R> {
    /// The category to backend table. Nothing else in the router knows
    /// about individual backends.
    pub fn for_category(
        category: JobCategory,
        runner: &'a R,
        settings: &'a BackendSettings,
    ) -> Self {
        match category {
            JobCategory::Training => Self::Slurm(SlurmBackend::new(runner, &settings.slurm)),
            JobCategory::Inference | JobCategory::Interactive => {
                Self::Kubernetes(KubernetesBackend::new(runner, &settings.kubernetes))
            }
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Slurm(_) => BackendKind::BatchScheduler,
            Self::Kubernetes(_) => BackendKind::Orchestrator,
        }
    }

    pub fn is_available(&self) -> bool {
        match self {
            Self::Slurm(backend) => backend.is_available(),
            Self::Kubernetes(backend) => backend.is_available(),
        }
    }

    /// Error describing which tool is missing for this backend.
    pub fn unavailable_error(&self) -> SubmitError {
        match self {
            Self::Slurm(backend) => SubmitError::BackendUnavailable {
                backend: "Slurm",
                tool: backend.settings().sbatch.clone(),
            },
            Self::Kubernetes(backend) => SubmitError::BackendUnavailable {
                backend: "Kubernetes",
                tool: backend.settings().kubectl.clone(),
            },
        }
    }

    pub async fn submit(&self, job: &JobSpec, dry_run: bool) -> Result<SubmissionResult> {
        match self {
            Self::Slurm(backend) => backend.submit(job, dry_run).await,
            Self::Kubernetes(backend) => backend.submit(job, dry_run).await,
        }
    }

    /// The native artifact without submitting: script text or manifest JSON.
    pub fn render(&self, job: &JobSpec) -> Result<String> {
        match self {
            Self::Slurm(backend) => Ok(backend.render(job)),
            Self::Kubernetes(backend) => {
                let (_, workload) = backend.render(job)?;
                Ok(serde_json::to_string_pretty(&workload)?)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::fake::FakeRunner;

    #[test]
    fn maps_categories_to_backends() {
        let runner = FakeRunner::default();
        let settings = BackendSettings::default();
        let kind = |c| Backend::for_category(c, &runner, &settings).kind();
        assert_eq!(kind(JobCategory::Training), BackendKind::BatchScheduler);
        assert_eq!(kind(JobCategory::Inference), BackendKind::Orchestrator);
        assert_eq!(kind(JobCategory::Interactive), BackendKind::Orchestrator);
    }

    #[test]
    fn unavailable_error_names_tool() {
        let runner = FakeRunner::default();
        let settings = BackendSettings::default();
        let backend = Backend::for_category(JobCategory::Inference, &runner, &settings);
        assert!(!backend.is_available());
        assert_eq!(
            backend.unavailable_error().to_string(),
            "Kubernetes backend appears down/unreachable (missing kubectl or no access)."
        );
    }

    #[test]
    fn settings_follow_config() {
        let mut config = Config::default();
        config.tools.sbatch = "/opt/slurm/bin/sbatch".into();
        config.probe.attempts = 5;
        let settings = BackendSettings::from(&config);
        assert_eq!(settings.slurm.sbatch, "/opt/slurm/bin/sbatch");
        assert_eq!(settings.slurm.probe_attempts, 5);
        assert_eq!(settings.kubernetes.kubectl, "kubectl");
    }
}
