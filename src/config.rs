use crate::core::get_config_dir;
use crate::core::quota::QuotaRegistry;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
pub struct Config {
    /// Team name to GPU ceiling. Entries override the built-in table.
    #[serde(default)]
    pub quotas: HashMap<String, u32>,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
}

/// External commands, by name on `PATH` or absolute path.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ToolsConfig {
    #[serde(default = "default_sbatch")]
    pub sbatch: String,
    #[serde(default = "default_squeue")]
    pub squeue: String,
    #[serde(default = "default_kubectl")]
    pub kubectl: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct RunnerConfig {
    /// Hard wall-clock limit for every external command
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ProbeConfig {
    /// How many times `squeue` is asked for a start time
    #[serde(default = "default_probe_attempts")]
    pub attempts: u32,
    #[serde(default = "default_probe_interval_ms")]
    pub interval_ms: u64,
}

fn default_sbatch() -> String {
    "sbatch".to_string()
}

fn default_squeue() -> String {
    "squeue".to_string()
}

fn default_kubectl() -> String {
    "kubectl".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_probe_attempts() -> u32 {
    3
}

fn default_probe_interval_ms() -> u64 {
    1000
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            sbatch: default_sbatch(),
            squeue: default_squeue(),
            kubectl: default_kubectl(),
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            attempts: default_probe_attempts(),
            interval_ms: default_probe_interval_ms(),
        }
    }
}

impl RunnerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ProbeConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Config {
    /// Built-in quotas with the configured entries layered on top.
    pub fn quota_registry(&self) -> QuotaRegistry {
        QuotaRegistry::default().with_overrides(self.quotas.iter().map(|(k, v)| (k.as_str(), *v)))
    }
}

pub fn load_config(config_path: Option<&PathBuf>) -> Result<Config, config::ConfigError> {
    let mut config_vec = vec![];

    // User-provided config file
    if let Some(config_path) = config_path {
        if config_path.exists() {
            config_vec.push(config_path.clone());
        } else {
            tracing::warn!("Config file {config_path:?} not found.");
        }
    }

    // Default config file
    if let Ok(default_config_path) = get_config_dir().map(|d| d.join("hsubmit.toml")) {
        if default_config_path.exists() {
            config_vec.push(default_config_path);
        }
    }

    let settings = config::Config::builder();
    // Later sources override earlier ones; the explicit file goes last.
    let settings = config_vec.iter().rev().fold(settings, |s, path| {
        s.add_source(config::File::from(path.as_path()))
    });

    settings
        .add_source(
            config::Environment::with_prefix("HSUBMIT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()
}
