//! Exchange adapters (Binance, Bybit, Bitget, OKX)
//!
//! Each adapter calls its exchange's public market-data endpoints and
//! hands back the payload with exchange field names already resolved.
//! Numbers stay as the exchange sent them; parsing, unit conversion and
//! sign conventions belong to the normalizer.

mod binance;
mod bitget;
mod bybit;
mod okx;

pub use binance::BinanceAdapter;
pub use bitget::BitgetAdapter;
pub use bybit::BybitAdapter;
pub use okx::OkxAdapter;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{AggregationConfig, ExchangesConfig};
use crate::types::{AggregationKind, Exchange};

/// Why an adapter produced no payload
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdapterFailure {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("unexpected HTTP status {0}")]
    Http(u16),
    #[error("invalid schema: {0}")]
    InvalidSchema(String),
    #[error("{0} is not served by this exchange")]
    UnsupportedKind(AggregationKind),
}

impl AdapterFailure {
    /// Stable reason code reported to clients
    pub fn reason(&self) -> &'static str {
        match self {
            AdapterFailure::Timeout(_) => "timeout",
            AdapterFailure::Network(_) => "network_error",
            AdapterFailure::Http(status) if (400..500).contains(status) => "http_4xx",
            AdapterFailure::Http(status) if (500..600).contains(status) => "http_5xx",
            AdapterFailure::Http(_) => "http_error",
            AdapterFailure::InvalidSchema(_) => "invalid_schema",
            AdapterFailure::UnsupportedKind(_) => "unsupported_kind",
        }
    }

    fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            AdapterFailure::Timeout(timeout)
        } else if let Some(status) = err.status() {
            AdapterFailure::Http(status.as_u16())
        } else if err.is_decode() {
            AdapterFailure::InvalidSchema(err.to_string())
        } else {
            AdapterFailure::Network(err.to_string())
        }
    }
}

/// Trait for exchange market-data adapters
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    /// Which exchange this adapter talks to
    fn exchange(&self) -> Exchange;

    /// Whether the exchange exposes data for this aggregation kind
    fn supports(&self, kind: AggregationKind) -> bool;

    /// Fetch the raw payload for `kind`, optionally limited to one
    /// instrument (e.g. "BTCUSDT")
    async fn fetch(
        &self,
        kind: AggregationKind,
        symbol_filter: Option<String>,
    ) -> std::result::Result<RawPayload, AdapterFailure>;
}

/// Exchange payload with field names resolved, values untouched
#[derive(Debug, Clone, PartialEq)]
pub enum RawPayload {
    FundingRates(Vec<RawFundingRow>),
    Trades {
        trades: Vec<RawTrade>,
        ticker: RawTicker,
    },
    Tickers(Vec<RawTicker>),
}

impl RawPayload {
    pub fn len(&self) -> usize {
        match self {
            RawPayload::FundingRates(rows) => rows.len(),
            RawPayload::Trades { trades, .. } => trades.len(),
            RawPayload::Tickers(tickers) => tickers.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawFundingRow {
    pub symbol: Option<String>,
    pub rate: Option<Value>,
    pub interval_hours: Option<u32>,
    pub quote_volume: Option<Value>,
    pub open_interest_value: Option<Value>,
}

/// How an exchange encodes trade direction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TradeSide {
    /// `true` when the buyer was the taker
    BuyerIsTaker(bool),
    /// Side string naming the counter side of the aggressor
    CounterSide(String),
    /// Side string naming the aggressor
    TakerSide(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTrade {
    pub price: Option<Value>,
    pub size: Option<Value>,
    pub side: Option<TradeSide>,
}

/// 24h price change as sent by the exchange
#[derive(Debug, Clone, PartialEq)]
pub enum PriceChange {
    /// Already in percent (2.5 means 2.5%)
    Percent(Value),
    /// Already a fraction (0.025 means 2.5%)
    Fraction(Value),
    /// Opening price 24h ago; compared with the last price
    SinceOpen(Value),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTicker {
    pub symbol: Option<String>,
    pub last_price: Option<Value>,
    /// 24h volume in base units
    pub base_volume: Option<Value>,
    /// 24h volume in quote units
    pub quote_volume: Option<Value>,
    /// Open interest in base units
    pub open_interest: Option<Value>,
    /// Open interest in quote units
    pub open_interest_value: Option<Value>,
    pub price_change: Option<PriceChange>,
}

/// Shared HTTP plumbing for adapters
#[derive(Debug, Clone)]
pub(crate) struct HttpSource {
    client: Client,
    timeout: Duration,
}

impl HttpSource {
    /// Build a client with a bounded timeout; the API key header is only
    /// attached when the exchange's key variable is set.
    pub(crate) fn new(exchange: Exchange, key_header: &'static str, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(key) = resolve_env(&[exchange.api_key_env()]) {
            let value = HeaderValue::from_str(&key)
                .with_context(|| format!("{} contains invalid header characters", exchange.api_key_env()))?;
            headers.insert(HeaderName::from_static(key_header), value);
            tracing::debug!(exchange = %exchange, "Using API key for public endpoints");
        }

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, timeout })
    }

    /// GET `url` and decode the body as `T`
    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> std::result::Result<T, AdapterFailure> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| AdapterFailure::from_reqwest(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AdapterFailure::Http(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| AdapterFailure::from_reqwest(e, self.timeout))?;

        serde_json::from_slice(&body).map_err(|e| AdapterFailure::InvalidSchema(e.to_string()))
    }
}

/// Endpoints that return an object for one symbol and an array otherwise
#[derive(Debug, serde::Deserialize)]
#[serde(untagged)]
pub(crate) enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl OneOrMany<Value> {
    /// Rows of a one-or-many body. A lone object must carry `key`; error
    /// bodies like `{"code":-1121,"msg":"..."}` or `null` are rejected
    /// instead of decoding into an empty row.
    pub(crate) fn into_rows(self, key: &str) -> std::result::Result<Vec<Value>, AdapterFailure> {
        match self {
            OneOrMany::Many(rows) => Ok(rows),
            OneOrMany::One(row) if row.get(key).is_some() => Ok(vec![row]),
            OneOrMany::One(row) => Err(AdapterFailure::InvalidSchema(format!(
                "expected object with \"{}\" or array, got {}",
                key,
                truncate(&row.to_string(), 120)
            ))),
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Decode each row on its own so one odd row cannot fail the whole list
pub(crate) fn decode_rows<T: DeserializeOwned + Default>(rows: Vec<Value>) -> Vec<T> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).unwrap_or_default())
        .collect()
}

fn resolve_env(var_names: &[&str]) -> Option<String> {
    for var in var_names {
        if let Ok(value) = std::env::var(var) {
            if !value.trim().is_empty() {
                return Some(value);
            }
        }
    }
    None
}

/// Split "BTCUSDT" / "btc-usdt" into ("BTC", "USDT")
pub(crate) fn split_usdt_pair(symbol: &str) -> Option<(String, &'static str)> {
    let upper = symbol.trim().to_uppercase().replace('-', "");
    let base = upper.strip_suffix("USDT")?;
    if base.is_empty() {
        return None;
    }
    Some((base.to_string(), "USDT"))
}

/// Instantiate every enabled adapter
pub fn build_adapters(
    exchanges: &ExchangesConfig,
    aggregation: &AggregationConfig,
) -> Result<Vec<Arc<dyn ExchangeAdapter>>> {
    let timeout = aggregation.timeout();
    let mut adapters: Vec<Arc<dyn ExchangeAdapter>> = Vec::new();

    if exchanges.binance.enabled {
        adapters.push(Arc::new(BinanceAdapter::new(
            &exchanges.binance.spot_url,
            &exchanges.binance.futures_url,
            aggregation,
            timeout,
        )?));
    }
    if exchanges.bybit.enabled {
        adapters.push(Arc::new(BybitAdapter::new(
            &exchanges.bybit.base_url,
            aggregation,
            timeout,
        )?));
    }
    if exchanges.bitget.enabled {
        adapters.push(Arc::new(BitgetAdapter::new(
            &exchanges.bitget.base_url,
            timeout,
        )?));
    }
    if exchanges.okx.enabled {
        adapters.push(Arc::new(OkxAdapter::new(
            &exchanges.okx.base_url,
            aggregation,
            timeout,
        )?));
    }

    tracing::info!(
        count = adapters.len(),
        exchanges = ?adapters.iter().map(|a| a.exchange()).collect::<Vec<_>>(),
        "Exchange adapters ready"
    );

    Ok(adapters)
}
