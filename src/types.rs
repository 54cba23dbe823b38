//! Core types used throughout cexpulse
//!
//! Defines the exchange set, aggregation kinds and the normalized quote
//! record every adapter output is reduced to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported exchanges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Exchange {
    Binance,
    Bybit,
    Bitget,
    #[serde(rename = "OKX")]
    Okx,
}

impl Exchange {
    pub const ALL: [Exchange; 4] = [
        Exchange::Binance,
        Exchange::Bybit,
        Exchange::Bitget,
        Exchange::Okx,
    ];

    /// Display name used on the wire and in logs
    pub fn name(&self) -> &'static str {
        match self {
            Exchange::Binance => "Binance",
            Exchange::Bybit => "Bybit",
            Exchange::Bitget => "Bitget",
            Exchange::Okx => "OKX",
        }
    }

    /// Environment variable holding an optional API key
    pub fn api_key_env(&self) -> &'static str {
        match self {
            Exchange::Binance => "BINANCE_API_KEY",
            Exchange::Bybit => "BYBIT_API_KEY",
            Exchange::Bitget => "BITGET_API_KEY",
            Exchange::Okx => "OKX_API_KEY",
        }
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What an aggregation cycle computes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationKind {
    FundingRate,
    FundFlow,
    Volume,
    OpenInterest,
}

impl AggregationKind {
    pub const ALL: [AggregationKind; 4] = [
        AggregationKind::FundingRate,
        AggregationKind::FundFlow,
        AggregationKind::Volume,
        AggregationKind::OpenInterest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationKind::FundingRate => "funding_rate",
            AggregationKind::FundFlow => "fund_flow",
            AggregationKind::Volume => "volume",
            AggregationKind::OpenInterest => "open_interest",
        }
    }
}

impl fmt::Display for AggregationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized record produced from any exchange payload.
///
/// `metric_value` depends on the aggregation kind: a funding rate as a
/// fraction (0.0001 means 0.01%), or a quote-currency amount for fund
/// flow, volume and open interest. It is always finite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeQuote {
    pub exchange: Exchange,
    /// Base asset, uppercase, quote suffix stripped ("BTC")
    pub symbol: String,
    pub metric_value: f64,
    /// 24h notional in quote currency
    pub volume_24h: Option<f64>,
    /// Open interest notional in quote currency
    pub open_interest: Option<f64>,
    /// 24h price change as a fraction
    pub price_change_24h: Option<f64>,
    /// Funding settlement interval in hours (funding rates only)
    pub settlement_interval_hours: Option<u32>,
    /// When the adapter captured the payload
    pub observed_at: DateTime<Utc>,
}

impl ExchangeQuote {
    pub fn new(exchange: Exchange, symbol: impl Into<String>, metric_value: f64) -> Self {
        Self {
            exchange,
            symbol: symbol.into(),
            metric_value,
            volume_24h: None,
            open_interest: None,
            price_change_24h: None,
            settlement_interval_hours: None,
            observed_at: Utc::now(),
        }
    }
}
