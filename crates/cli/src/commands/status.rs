//! `hemobank status`: Configuration and store summary.

use hemobank_config::AppConfig;

use super::{CliResult, Runtime};

pub async fn run(check: bool) -> CliResult {
    let rt = Runtime::load().await?;
    let config = &rt.config;

    println!("HemoBank Status");
    println!("===============");
    println!("  Config dir:   {}", AppConfig::config_dir().display());
    println!("  Store:        {} ({})", rt.store.name(), config.store.path.display());
    println!("  Classifier:   {} / {}", config.classifier.provider, config.classifier.model);
    println!("  API key:      {}", if config.has_api_key() { "configured" } else { "missing" });
    println!(
        "  Scheduler:    {} `{}` (lookahead {}d, refill {:?}, {} cities in parallel)",
        if config.scheduler.enabled { "enabled" } else { "disabled" },
        config.scheduler.schedule,
        config.scheduler.lookahead_days,
        config.scheduler.refill,
        config.scheduler.max_parallel_cities,
    );

    let cities = rt.store.cities().await?;
    let pending = rt.store.pending_schedules().await?;
    println!("  Cities:       {}", cities.len());
    println!("  Appointments: {} pending", pending.len());

    if check {
        let router = hemobank_providers::build_from_config(config);
        let reachable = match router.default() {
            Some(provider) => match provider.health_check().await {
                Ok(true) => "reachable".to_string(),
                Ok(false) => "rejected the request".to_string(),
                Err(e) => format!("unreachable ({e})"),
            },
            None => "not configured".to_string(),
        };
        println!("  Provider:     {reachable}");
    }

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("\n  Config file found");
    } else {
        println!("\n  No config file — run `hemobank onboard` first");
    }

    Ok(())
}
