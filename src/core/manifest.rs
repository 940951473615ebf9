//! Turns a loosely-typed YAML manifest into a [`JobSpec`].
//!
//! Validation never stops at the first problem: every missing key, type
//! mismatch and range violation is collected into one
//! [`SubmitError::ManifestInvalid`].

use crate::core::error::{Result, SubmitError};
use crate::core::job::{JobBuilder, JobCategory, JobSpec, Priority};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use strum::IntoEnumIterator;

const REQUIRED_KEYS: [&str; 8] = [
    "team",
    "user",
    "job_type",
    "gpus",
    "duration_hours",
    "image",
    "priority",
    "command",
];

const OPTIONAL_KEYS: [&str; 4] = ["name", "namespace", "workdir", "env"];

/// Read and validate a manifest file. An unreadable file is an I/O error,
/// not an invalid manifest.
pub fn load_manifest(path: impl AsRef<Path>) -> Result<JobSpec> {
    let text = std::fs::read_to_string(path)?;
    parse_manifest(&text)
}

/// Validate manifest text.
pub fn parse_manifest(text: &str) -> Result<JobSpec> {
    let value: Value = serde_yaml::from_str(text)
        .map_err(|e| SubmitError::manifest(format!("manifest is not valid YAML: {e}")))?;
    match value {
        Value::Mapping(map) => JobSpec::from_mapping(&map),
        _ => Err(SubmitError::manifest("Manifest must be a YAML mapping (dict).")),
    }
}

impl JobSpec {
    pub fn from_mapping(map: &Mapping) -> Result<JobSpec> {
        let mut problems = Vec::new();
        let mut builder = JobBuilder::new();

        let missing: Vec<&str> = REQUIRED_KEYS
            .iter()
            .copied()
            .filter(|key| matches!(map.get(*key), None | Some(Value::Null)))
            .collect();
        if !missing.is_empty() {
            problems.push(format!("Missing required fields: [{}]", missing.join(", ")));
        }

        for key in map.keys() {
            if let Some(key) = key.as_str() {
                if !REQUIRED_KEYS.contains(&key) && !OPTIONAL_KEYS.contains(&key) {
                    tracing::debug!(key, "Ignoring unknown manifest key");
                }
            }
        }

        let text_field = |key: &'static str, problems: &mut Vec<String>| -> Option<String> {
            let value = present(map, key)?;
            match scalar_to_string(value) {
                Some(s) => Some(s.trim().to_string()),
                None => {
                    problems.push(format!("{key} must be a string"));
                    None
                }
            }
        };

        if let Some(team) = text_field("team", &mut problems) {
            builder = builder.team(team);
        }
        if let Some(user) = text_field("user", &mut problems) {
            builder = builder.user(user);
        }
        if let Some(image) = text_field("image", &mut problems) {
            builder = builder.image(image);
        }
        if let Some(command) = text_field("command", &mut problems) {
            builder = builder.command(command);
        }

        if let Some(job_type) = text_field("job_type", &mut problems) {
            match JobCategory::from_str(&job_type) {
                Ok(category) => builder = builder.category(category),
                Err(_) => problems.push(format!(
                    "Invalid job_type '{job_type}'. Must be one of {}",
                    sorted_choices::<JobCategory>()
                )),
            }
        }

        if let Some(priority) = text_field("priority", &mut problems) {
            match Priority::from_str(&priority) {
                Ok(priority) => builder = builder.priority(priority),
                Err(_) => problems.push(format!(
                    "Invalid priority '{priority}'. Must be one of {}",
                    sorted_choices::<Priority>()
                )),
            }
        }

        if let Some(value) = present(map, "gpus") {
            match as_integer(value) {
                Some(gpus) => builder = builder.gpus(gpus),
                None => problems.push("gpus must be a positive integer".into()),
            }
        }

        if let Some(value) = present(map, "duration_hours") {
            match as_float(value) {
                Some(hours) => builder = builder.duration_hours(hours),
                None => problems.push("duration_hours must be a number".into()),
            }
        }

        if let Some(name) = text_field("name", &mut problems) {
            builder = builder.name(Some(name));
        }
        if let Some(namespace) = text_field("namespace", &mut problems) {
            builder = builder.namespace(Some(namespace));
        }
        if let Some(workdir) = text_field("workdir", &mut problems) {
            builder = builder.workdir(workdir);
        }

        match present(map, "env") {
            None => {}
            Some(Value::Mapping(env)) => match env_to_strings(env) {
                Ok(env) => builder = builder.env(env),
                Err(problem) => problems.push(problem),
            },
            Some(_) => problems.push("env must be a mapping (dict)".into()),
        }

        // Unset fields were already reported above as missing or mistyped.
        problems.extend(builder.check().invalid);

        if !problems.is_empty() {
            return Err(SubmitError::ManifestInvalid { problems });
        }
        builder.build()
    }
}

fn present<'a>(map: &'a Mapping, key: &str) -> Option<&'a Value> {
    map.get(key).filter(|v| !v.is_null())
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Tagged(tagged) => scalar_to_string(&tagged.value),
        _ => None,
    }
}

fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn env_to_strings(env: &Mapping) -> std::result::Result<BTreeMap<String, String>, String> {
    let mut out = BTreeMap::new();
    for (k, v) in env {
        let key = scalar_to_string(k).ok_or("env keys must be strings")?;
        let value = match v {
            Value::Null => String::new(),
            other => scalar_to_string(other)
                .ok_or_else(|| format!("env value for '{key}' must be a scalar"))?,
        };
        out.insert(key, value);
    }
    Ok(out)
}

fn sorted_choices<E>() -> String
where
    E: IntoEnumIterator + Into<&'static str>,
{
    let mut names: Vec<&'static str> = E::iter().map(Into::into).collect();
    names.sort_unstable();
    let quoted: Vec<String> = names.iter().map(|n| format!("'{n}'")).collect();
    format!("[{}]", quoted.join(", "))
}
