use crate::cli::SubmitArgs;
use hybrid_submit::config::Config;
use hybrid_submit::core::manifest::load_manifest;
use hybrid_submit::core::router::Router;

pub async fn handle_submit(config: &Config, args: SubmitArgs) -> anyhow::Result<()> {
    let job = load_manifest(&args.config)?;
    let router = Router::from_config(config);

    let result = router.submit(&job, args.dry_run).await?;
    println!("{}", result.to_pretty_json()?);
    Ok(())
}
