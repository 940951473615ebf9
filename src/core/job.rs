use crate::core::error::{Result, SubmitError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

pub const DEFAULT_WORKDIR: &str = "/workspace";

/// Names usable both as `export` targets and as container env names.
static ENV_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"));

/// Kind of workload. Decides which backend receives the job.
#[derive(
    Debug,
    Deserialize,
    Serialize,
    PartialEq,
    Eq,
    Clone,
    Copy,
    Hash,
    Display,
    EnumIter,
    EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum JobCategory {
    Training,
    Inference,
    Interactive,
}

#[derive(
    Debug,
    Deserialize,
    Serialize,
    PartialEq,
    Eq,
    Clone,
    Copy,
    Default,
    Display,
    EnumIter,
    EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Priority {
    #[default]
    Normal,
    High,
}

/// A validated job request. Only obtainable through [`JobBuilder::build`],
/// so every instance satisfies the field invariants.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct JobSpec {
    pub(crate) team: String,
    pub(crate) user: String,
    pub(crate) category: JobCategory,
    pub(crate) gpus: u32,
    pub(crate) duration_hours: f64,
    pub(crate) image: String,
    pub(crate) priority: Priority,
    pub(crate) command: String,

    pub(crate) name: Option<String>,
    pub(crate) namespace: Option<String>,
    pub(crate) workdir: String,
    pub(crate) env: BTreeMap<String, String>,
}

impl JobSpec {
    pub fn builder() -> JobBuilder {
        JobBuilder::new()
    }

    pub fn team(&self) -> &str {
        &self.team
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn category(&self) -> JobCategory {
        self.category
    }

    pub fn gpus(&self) -> u32 {
        self.gpus
    }

    pub fn duration_hours(&self) -> f64 {
        self.duration_hours
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn workdir(&self) -> &str {
        &self.workdir
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }
}

#[derive(Debug, Default, Clone)]
pub struct JobBuilder {
    team: Option<String>,
    user: Option<String>,
    category: Option<JobCategory>,
    gpus: Option<i64>,
    duration_hours: Option<f64>,
    image: Option<String>,
    priority: Option<Priority>,
    command: Option<String>,
    name: Option<String>,
    namespace: Option<String>,
    workdir: Option<String>,
    env: BTreeMap<String, String>,
}

/// Outcome of checking a builder without consuming it.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct BuilderCheck {
    /// Required fields that were never set, by manifest key.
    pub unset: Vec<&'static str>,
    /// Fields that were set but violate an invariant.
    pub invalid: Vec<String>,
}

impl JobBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn team(mut self, team: impl Into<String>) -> Self {
        self.team = Some(team.into().trim().to_string());
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into().trim().to_string());
        self
    }

    pub fn category(mut self, category: JobCategory) -> Self {
        self.category = Some(category);
        self
    }

    /// Signed so out-of-range requests reach validation instead of wrapping.
    pub fn gpus(mut self, gpus: i64) -> Self {
        self.gpus = Some(gpus);
        self
    }

    pub fn duration_hours(mut self, hours: f64) -> Self {
        self.duration_hours = Some(hours);
        self
    }

    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into().trim().to_string());
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into().trim().to_string());
        self
    }

    /// Blank names are treated as absent so the backend derives one.
    pub fn name(mut self, name: Option<String>) -> Self {
        self.name = non_blank(name);
        self
    }

    pub fn namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = non_blank(namespace);
        self
    }

    pub fn workdir(mut self, workdir: impl Into<String>) -> Self {
        self.workdir = Some(workdir.into().trim().to_string());
        self
    }

    pub fn env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub(crate) fn check(&self) -> BuilderCheck {
        let mut check = BuilderCheck::default();

        for (key, value) in [
            ("team", &self.team),
            ("user", &self.user),
            ("image", &self.image),
            ("command", &self.command),
        ] {
            match value {
                None => check.unset.push(key),
                Some(v) if v.is_empty() => check.invalid.push(format!("{key} must not be empty")),
                Some(_) => {}
            }
        }
        if self.category.is_none() {
            check.unset.push("job_type");
        }
        if self.priority.is_none() {
            check.unset.push("priority");
        }

        match self.gpus {
            None => check.unset.push("gpus"),
            Some(n) if n <= 0 => check.invalid.push("gpus must be a positive integer".into()),
            Some(n) if u32::try_from(n).is_err() => {
                check.invalid.push(format!("gpus must be at most {}", u32::MAX))
            }
            Some(_) => {}
        }

        match self.duration_hours {
            None => check.unset.push("duration_hours"),
            Some(h) if !h.is_finite() || h <= 0.0 => {
                check.invalid.push("duration_hours must be > 0".into())
            }
            Some(_) => {}
        }

        if matches!(&self.workdir, Some(w) if w.is_empty()) {
            check.invalid.push("workdir must not be empty".into());
        }
        for key in self.env.keys().filter(|k| !ENV_KEY_RE.is_match(k)) {
            check.invalid.push(format!(
                "env key '{key}' must match [A-Za-z_][A-Za-z0-9_]*"
            ));
        }

        check
    }

    /// Validates everything at once; a failure lists every problem found.
    pub fn build(self) -> Result<JobSpec> {
        let check = self.check();
        let mut problems = Vec::new();
        if !check.unset.is_empty() {
            problems.push(format!(
                "Missing required fields: [{}]",
                check.unset.join(", ")
            ));
        }
        problems.extend(check.invalid);
        if !problems.is_empty() {
            return Err(SubmitError::ManifestInvalid { problems });
        }

        let (
            Some(team),
            Some(user),
            Some(category),
            Some(gpus),
            Some(duration_hours),
            Some(image),
            Some(priority),
            Some(command),
        ) = (
            self.team,
            self.user,
            self.category,
            self.gpus.and_then(|n| u32::try_from(n).ok()),
            self.duration_hours,
            self.image,
            self.priority,
            self.command,
        )
        else {
            return Err(SubmitError::manifest("incomplete job description"));
        };

        Ok(JobSpec {
            team,
            user,
            category,
            gpus,
            duration_hours,
            image,
            priority,
            command,
            name: self.name,
            namespace: self.namespace,
            workdir: self.workdir.unwrap_or_else(|| DEFAULT_WORKDIR.to_string()),
            env: self.env,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
