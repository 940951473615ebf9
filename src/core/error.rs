use std::time::Duration;
use thiserror::Error;

/// Every way a submission can fail.
///
/// Callers branch on the variant; [`SubmitError::is_operational`] splits the
/// kinds into expected policy/environment failures and internal bugs.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("invalid manifest: {}", .problems.join("; "))]
    ManifestInvalid { problems: Vec<String> },

    #[error("Quota exceeded for team '{team}': requested {requested} GPUs, limit is {limit} GPUs.")]
    QuotaExceeded {
        team: String,
        requested: u32,
        limit: u32,
    },

    #[error("{backend} backend appears down/unreachable (missing {tool} or no access).")]
    BackendUnavailable {
        backend: &'static str,
        tool: String,
    },

    #[error("{0}")]
    SubmissionFailed(String),

    #[error("`{program}` did not finish within {}s", .timeout.as_secs())]
    ProcessTimeout { program: String, timeout: Duration },

    #[error("Unsupported job_type: {0}")]
    UnsupportedCategory(String),

    #[error("failed to serialize submission artifact: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SubmitError {
    pub fn manifest(problem: impl Into<String>) -> Self {
        Self::ManifestInvalid {
            problems: vec![problem.into()],
        }
    }

    /// Operational errors are expected outcomes of bad input, policy or the
    /// environment. Everything else points at a bug or a broken host.
    pub fn is_operational(&self) -> bool {
        matches!(
            self,
            Self::ManifestInvalid { .. }
                | Self::QuotaExceeded { .. }
                | Self::BackendUnavailable { .. }
                | Self::SubmissionFailed(_)
                | Self::ProcessTimeout { .. }
        )
    }
}

pub type Result<T, E = SubmitError> = std::result::Result<T, E>;
