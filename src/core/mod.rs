pub mod error;
pub mod job;
pub mod manifest;
pub mod quota;
pub mod router;
pub mod submission;

use std::path::PathBuf;

pub fn version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        "\nAuthors: ",
        env!("CARGO_PKG_AUTHORS")
    )
}

pub fn get_config_dir() -> anyhow::Result<PathBuf> {
    dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Failed to get config directory"))
        .map(|p| p.join("hybrid-submit"))
}
