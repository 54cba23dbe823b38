//! Configuration management for cexpulse
//!
//! Loads from optional config files + environment variables via .env

mod types;

pub use types::*;

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub aggregation: AggregationConfig,
    pub cache: CacheConfig,
    pub exchanges: ExchangesConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = Self::builder()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (CEXPULSE__SERVER__PORT=9000)
            .add_source(
                Environment::with_prefix("CEXPULSE")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        app_config.validate()?;
        Ok(app_config)
    }

    /// Built-in defaults only, no files or environment
    pub fn defaults() -> Result<Self> {
        let config = Self::builder()?
            .build()
            .context("Failed to build default configuration")?;
        config
            .try_deserialize()
            .context("Failed to deserialize default configuration")
    }

    fn builder() -> Result<config::builder::ConfigBuilder<config::builder::DefaultState>> {
        Ok(Config::builder()
            // Server defaults
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            // Aggregation defaults
            .set_default("aggregation.timeout_secs", 8)?
            .set_default("aggregation.large_order_threshold", 100_000.0)?
            .set_default("aggregation.flow_symbol", "BTCUSDT")?
            .set_default("aggregation.trade_limit", 1000)?
            // Cache defaults
            .set_default("cache.funding_rate_ttl_secs", 60)?
            .set_default("cache.fund_flow_ttl_secs", 60)?
            .set_default("cache.volume_ttl_secs", 60)?
            .set_default("cache.open_interest_ttl_secs", 60)?
            // Exchange defaults
            .set_default("exchanges.binance.enabled", true)?
            .set_default("exchanges.binance.spot_url", "https://api.binance.com")?
            .set_default("exchanges.binance.futures_url", "https://fapi.binance.com")?
            .set_default("exchanges.bybit.enabled", true)?
            .set_default("exchanges.bybit.base_url", "https://api.bybit.com")?
            .set_default("exchanges.bitget.enabled", true)?
            .set_default("exchanges.bitget.base_url", "https://api.bitget.com")?
            .set_default("exchanges.okx.enabled", true)?
            .set_default("exchanges.okx.base_url", "https://www.okx.com")?
            // Logging defaults
            .set_default("logging.json", false)?
            .set_default("logging.filter", "cexpulse=info,tower_http=info")?)
    }

    /// Reject settings the aggregation cycle cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.aggregation.timeout_secs == 0 {
            bail!("aggregation.timeout_secs must be greater than zero");
        }
        if !self.aggregation.large_order_threshold.is_finite()
            || self.aggregation.large_order_threshold <= 0.0
        {
            bail!("aggregation.large_order_threshold must be a positive number");
        }
        if !self.aggregation.flow_symbol.to_uppercase().ends_with("USDT") {
            bail!(
                "aggregation.flow_symbol must be a USDT pair, got {}",
                self.aggregation.flow_symbol
            );
        }
        if self.aggregation.trade_limit == 0 {
            bail!("aggregation.trade_limit must be greater than zero");
        }
        Ok(())
    }

    /// Generate a digest of the config (without secrets) for logging
    pub fn digest(&self) -> String {
        let enabled: Vec<&str> = [
            ("Binance", self.exchanges.binance.enabled),
            ("Bybit", self.exchanges.bybit.enabled),
            ("Bitget", self.exchanges.bitget.enabled),
            ("OKX", self.exchanges.okx.enabled),
        ]
        .iter()
        .filter(|(_, on)| *on)
        .map(|(name, _)| *name)
        .collect();

        format!(
            "listen={}:{} exchanges={:?} timeout={}s flow_symbol={} large_order={:.0}",
            self.server.host,
            self.server.port,
            enabled,
            self.aggregation.timeout_secs,
            self.aggregation.flow_symbol,
            self.aggregation.large_order_threshold
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AggregationKind;
    use std::time::Duration;

    #[test]
    fn defaults_deserialize_and_validate() {
        let cfg = AppConfig::defaults().expect("defaults should load");
        cfg.validate().expect("defaults should validate");
        assert_eq!(cfg.server.port, 3000);
        assert_eq!(cfg.aggregation.flow_symbol, "BTCUSDT");
        assert!(cfg.aggregation.funding_symbol.is_none());
        assert_eq!(cfg.cache.ttl(AggregationKind::FundFlow), Duration::from_secs(60));
        assert!(cfg.exchanges.okx.enabled);
    }

    #[test]
    fn validate_rejects_non_usdt_flow_symbol() {
        let mut cfg = AppConfig::defaults().unwrap();
        cfg.aggregation.flow_symbol = "BTCEUR".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn digest_lists_enabled_exchanges_only() {
        let mut cfg = AppConfig::defaults().unwrap();
        cfg.exchanges.bitget.enabled = false;
        let digest = cfg.digest();
        assert!(digest.contains("Binance"));
        assert!(!digest.contains("Bitget"));
    }
}
