use crate::core::error::{Result, SubmitError};
use crate::core::job::{JobSpec, Priority};
use crate::core::submission::{BackendKind, SubmissionResult, DRY_RUN_JOB_ID};
use crate::process::ProcessRunner;
use crate::utils::{format_time_limit, now_utc_iso, shell_quote};
use regex::Regex;
use serde_json::{Map, Value};
use std::io::Write;
use std::sync::LazyLock;
use std::time::Duration;

static JOB_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Submitted batch job\s+(\d+)").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlurmSettings {
    pub sbatch: String,
    pub squeue: String,
    pub probe_attempts: u32,
    pub probe_interval: Duration,
}

impl Default for SlurmSettings {
    fn default() -> Self {
        Self {
            sbatch: "sbatch".to_string(),
            squeue: "squeue".to_string(),
            probe_attempts: 3,
            probe_interval: Duration::from_secs(1),
        }
    }
}

/// Submits training jobs through `sbatch`.
pub struct SlurmBackend<'a, R> {
    runner: &'a R,
    settings: &'a SlurmSettings,
}

impl<'a, R: ProcessRunner> SlurmBackend<'a, R> {
    pub fn new(runner: &'a R, settings: &'a SlurmSettings) -> Self {
        Self { runner, settings }
    }

    pub fn settings(&self) -> &SlurmSettings {
        self.settings
    }

    pub fn is_available(&self) -> bool {
        self.runner.which(&self.settings.sbatch).is_some()
    }

    pub fn render(&self, job: &JobSpec) -> String {
        render_script(job, &job_name(job))
    }

    #[tracing::instrument(skip(self, job), fields(team = %job.team()))]
    pub async fn submit(&self, job: &JobSpec, dry_run: bool) -> Result<SubmissionResult> {
        let script = self.render(job);

        if dry_run {
            let mut details = Map::new();
            details.insert("rendered_script".into(), Value::String(script));
            return Ok(SubmissionResult {
                backend: BackendKind::BatchScheduler,
                job_id: DRY_RUN_JOB_ID.to_string(),
                expected_start_time: now_utc_iso(),
                details,
            });
        }

        let output = {
            // Removed from disk when dropped, whatever sbatch did.
            let mut script_file = tempfile::Builder::new()
                .prefix("hsubmit-")
                .suffix(".sbatch")
                .tempfile()?;
            script_file.write_all(script.as_bytes())?;
            script_file.flush()?;

            let path = script_file.path().to_string_lossy().into_owned();
            self.runner.run(&self.settings.sbatch, &[path]).await?
        };

        if !output.success() {
            return Err(SubmitError::SubmissionFailed(format!(
                "sbatch failed (rc={}): {}",
                output.code,
                output.diagnostic()
            )));
        }

        let job_id = parse_job_id(&output.stdout).ok_or_else(|| {
            SubmitError::SubmissionFailed(format!(
                "Could not parse Slurm job id from sbatch output: '{}'",
                output.stdout
            ))
        })?;
        tracing::info!(job_id, "Submitted Slurm job");

        let start = match self.probe_start_time(&job_id).await {
            Some(start) => start,
            None => now_utc_iso(),
        };

        let mut details = Map::new();
        details.insert("sbatch_output".into(), Value::String(output.stdout));
        Ok(SubmissionResult {
            backend: BackendKind::BatchScheduler,
            job_id,
            expected_start_time: start,
            details,
        })
    }

    /// Ask `squeue` for the expected start. Never fails; `None` means unknown.
    async fn probe_start_time(&self, job_id: &str) -> Option<String> {
        if self.runner.which(&self.settings.squeue).is_none() {
            tracing::debug!(squeue = %self.settings.squeue, "squeue not found, skipping start-time probe");
            return None;
        }

        let args: Vec<String> = ["-j", job_id, "-h", "-o", "%S"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        for attempt in 1..=self.settings.probe_attempts {
            match self.runner.run(&self.settings.squeue, &args).await {
                Ok(out) if out.success() && !out.stdout.is_empty() && out.stdout != "N/A" => {
                    return Some(out.stdout);
                }
                Ok(out) => {
                    tracing::debug!(attempt, code = out.code, "No start time reported yet")
                }
                Err(err) => tracing::debug!(attempt, error = %err, "Start-time probe failed"),
            }
            if attempt < self.settings.probe_attempts {
                tokio::time::sleep(self.settings.probe_interval).await;
            }
        }
        None
    }
}

/// `--job-name`: the caller's name, else `{team}-{user}-train`.
pub fn job_name(job: &JobSpec) -> String {
    job.name()
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}-{}-train", job.team(), job.user()))
}

pub fn parse_job_id(sbatch_output: &str) -> Option<String> {
    JOB_ID_RE
        .captures(sbatch_output)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

pub fn qos(priority: Priority) -> &'static str {
    match priority {
        Priority::High => "high",
        Priority::Normal => "normal",
    }
}

/// Build the batch script for `job`.
///
/// The command runs inside enroot when the compute node has it and falls
/// back to running directly on the host otherwise, outside any container.
pub fn render_script(job: &JobSpec, job_name: &str) -> String {
    let env_lines = job
        .env()
        .iter()
        .map(|(k, v)| format!("export {k}={}", shell_quote(v)))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"#!/bin/bash
#SBATCH --job-name={job_name}
#SBATCH --output=slurm-%j.out
#SBATCH --error=slurm-%j.err
#SBATCH --time={time_limit}
#SBATCH --gres=gpu:{gpus}
#SBATCH --qos={qos}
#SBATCH --account={team}

set -euo pipefail

{env_lines}

echo "Starting job on $(hostname) at $(date)"
cd {workdir}

# Prefer a container runtime when the node provides one.
if command -v enroot >/dev/null 2>&1; then
  echo "Using enroot to run image: {image}"
  enroot start --rw {job_name} {command}
else
  echo "WARNING: enroot not found; running command on host."
  {command}
fi
"#,
        time_limit = format_time_limit(job.duration_hours()),
        gpus = job.gpus(),
        qos = qos(job.priority()),
        team = job.team(),
        workdir = job.workdir(),
        image = job.image(),
        command = job.command(),
    )
}
