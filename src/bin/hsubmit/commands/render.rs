use hybrid_submit::config::Config;
use hybrid_submit::core::manifest::load_manifest;
use hybrid_submit::core::router::Router;
use std::path::Path;

pub fn handle_render(config: &Config, manifest: &Path) -> anyhow::Result<()> {
    let job = load_manifest(manifest)?;
    let artifact = Router::from_config(config).render(&job)?;
    println!("{artifact}");
    Ok(())
}
