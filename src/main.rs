//! cexpulse - multi-exchange aggregation API server

use anyhow::{Context, Result};

use cexpulse::aggregation::{AggregateCache, Aggregator, AggregatorSettings};
use cexpulse::config::AppConfig;
use cexpulse::dashboard::{self, AppState};
use cexpulse::logging::init_tracing;
use cexpulse::sources::build_adapters;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load().context("Failed to load configuration")?;
    init_tracing(&config.logging)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting cexpulse");
    tracing::info!(config = %config.digest(), "Configuration loaded");

    let adapters = build_adapters(&config.exchanges, &config.aggregation)?;
    if adapters.is_empty() {
        tracing::warn!("No exchanges enabled; every aggregate request will fail");
    }

    let aggregator = Aggregator::new(adapters, AggregatorSettings::from_config(&config.aggregation));
    let cache = AggregateCache::new(&config.cache);

    dashboard::start_server(AppState::new(aggregator, cache), &config.server).await
}
