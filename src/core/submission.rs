use serde::Serialize;
use serde_json::{Map, Value};
use strum::Display;

/// Placeholder job id returned when nothing was actually submitted.
pub const DRY_RUN_JOB_ID: &str = "DRY_RUN";

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq, Display)]
pub enum BackendKind {
    #[serde(rename = "slurm")]
    #[strum(serialize = "slurm")]
    BatchScheduler,
    #[serde(rename = "kubernetes")]
    #[strum(serialize = "kubernetes")]
    Orchestrator,
}

/// What every backend hands back after a submit call.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct SubmissionResult {
    pub backend: BackendKind,
    pub job_id: String,
    /// ISO-8601 UTC; falls back to the submission time when unknown.
    pub expected_start_time: String,
    /// Backend specific diagnostics.
    pub details: Map<String, Value>,
}

impl SubmissionResult {
    pub fn is_dry_run(&self) -> bool {
        self.job_id == DRY_RUN_JOB_ID
    }

    /// Pretty JSON with keys in sorted order.
    pub fn to_pretty_json(&self) -> serde_json::Result<String> {
        // Round-trip through `Value` so struct fields are sorted too.
        let value = serde_json::to_value(self)?;
        serde_json::to_string_pretty(&value)
    }
}
