use std::sync::Arc;

use clap::Parser;
use realm_server::{Cli, InMemoryQuestPersistence, Listeners, RateLimiter, Registry, ServerConfig};
use tokio::signal;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let base_config = match &cli.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    let config = Arc::new(cli.apply_overrides(base_config));

    if cli.print_config {
        println!("{}", config.to_toml_string());
        return Ok(());
    }

    let registry = Arc::new(Registry::with_defaults());
    let rate_limiter = Arc::new(RateLimiter::new());
    let persistence = Arc::new(InMemoryQuestPersistence::new());
    let listeners = Arc::new(Listeners::new());

    let sweep_interval = std::time::Duration::from_secs(config.rate_limit.sweep_interval_secs);
    realm_server::ratelimit::spawn_sweeper(rate_limiter.clone(), sweep_interval);

    for listener_config in config.listeners.clone() {
        let addr = listeners
            .start(
                listener_config.clone(),
                registry.clone(),
                rate_limiter.clone(),
                config.clone(),
                persistence.clone(),
            )
            .await?;
        tracing::info!(name = %listener_config.name, %addr, role = ?listener_config.role, "listener started");
    }

    signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");

    for name in listeners.names() {
        listeners.stop(&name).await;
    }

    Ok(())
}
