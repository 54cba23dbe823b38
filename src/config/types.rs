//! Configuration section types

use serde::Deserialize;
use std::time::Duration;

use crate::types::AggregationKind;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,
    /// Listen port
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AggregationConfig {
    /// Per-adapter timeout in seconds (HTTP client and whole fetch)
    pub timeout_secs: u64,
    /// Trades at or above this quote notional count as large orders
    pub large_order_threshold: f64,
    /// Instrument used for fund flow (e.g. "BTCUSDT")
    pub flow_symbol: String,
    /// Restrict funding rates to one instrument; all USDT perps when unset
    #[serde(default)]
    pub funding_symbol: Option<String>,
    /// Recent trades requested per exchange (capped by each exchange)
    pub trade_limit: u32,
}

impl AggregationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub funding_rate_ttl_secs: u64,
    pub fund_flow_ttl_secs: u64,
    pub volume_ttl_secs: u64,
    pub open_interest_ttl_secs: u64,
}

impl CacheConfig {
    /// Validity window for a kind's cache slot
    pub fn ttl(&self, kind: AggregationKind) -> Duration {
        let secs = match kind {
            AggregationKind::FundingRate => self.funding_rate_ttl_secs,
            AggregationKind::FundFlow => self.fund_flow_ttl_secs,
            AggregationKind::Volume => self.volume_ttl_secs,
            AggregationKind::OpenInterest => self.open_interest_ttl_secs,
        };
        Duration::from_secs(secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            funding_rate_ttl_secs: 60,
            fund_flow_ttl_secs: 60,
            volume_ttl_secs: 60,
            open_interest_ttl_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BinanceEndpoint {
    pub enabled: bool,
    /// Spot REST root (trades, 24h ticker)
    pub spot_url: String,
    /// USDⓈ-M futures REST root (premium index, futures tickers)
    pub futures_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeEndpoint {
    pub enabled: bool,
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangesConfig {
    pub binance: BinanceEndpoint,
    pub bybit: ExchangeEndpoint,
    pub bitget: ExchangeEndpoint,
    pub okx: ExchangeEndpoint,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
    /// Default filter when RUST_LOG is unset
    pub filter: String,
}
