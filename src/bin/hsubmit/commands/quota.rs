use hybrid_submit::config::Config;

pub fn handle_quota(config: &Config, team: &str) -> anyhow::Result<()> {
    let registry = config.quota_registry();
    let quota = registry.lookup(team);

    if registry.has_explicit_entry(team) {
        println!("{team}: {} GPUs", quota.max_gpus);
    } else {
        println!("{team}: {} GPUs (default)", quota.max_gpus);
    }
    Ok(())
}
