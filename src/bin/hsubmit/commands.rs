use crate::cli::Commands;
use hybrid_submit::config::load_config;
use std::path::PathBuf;

mod completions;
mod quota;
mod render;
mod submit;

pub async fn handle_commands(settings: Option<&PathBuf>, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Submit(args) => {
            let config = load_config(settings)?;
            submit::handle_submit(&config, args).await
        }
        Commands::Quota { team } => {
            let config = load_config(settings)?;
            quota::handle_quota(&config, &team)
        }
        Commands::Render { config: manifest } => {
            let config = load_config(settings)?;
            render::handle_render(&config, &manifest)
        }
        Commands::Completions { shell } => completions::handle_completions(shell),
    }
}
