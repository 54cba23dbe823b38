//! OKX V5 REST adapter
//!
//! Spot trades for fund flow, USDT swaps for volume and open interest.
//! Funding rates are per-instrument on OKX and are not aggregated here.

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use crate::config::AggregationConfig;
use crate::sources::{
    decode_rows, split_usdt_pair, AdapterFailure, ExchangeAdapter, HttpSource, PriceChange,
    RawPayload, RawTicker, RawTrade, TradeSide,
};
use crate::types::{AggregationKind, Exchange};

const MAX_TRADES: u32 = 500;

#[derive(Debug, Deserialize)]
struct Envelope {
    code: Option<String>,
    msg: Option<String>,
    data: Option<Vec<Value>>,
}

impl Envelope {
    fn into_data(self) -> Result<Vec<Value>, AdapterFailure> {
        if let Some(code) = self.code.as_deref().filter(|c| *c != "0") {
            return Err(AdapterFailure::InvalidSchema(format!(
                "code {}: {}",
                code,
                self.msg.as_deref().unwrap_or_default()
            )));
        }
        self.data
            .ok_or_else(|| AdapterFailure::InvalidSchema("missing data".to_string()))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ticker {
    inst_id: Option<String>,
    last: Option<Value>,
    open24h: Option<Value>,
    vol24h: Option<Value>,
    vol_ccy24h: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct Trade {
    px: Option<Value>,
    sz: Option<Value>,
    side: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenInterest {
    inst_id: Option<String>,
    oi_ccy: Option<Value>,
    oi_usd: Option<Value>,
}

pub struct OkxAdapter {
    http: HttpSource,
    base_url: String,
    flow_symbol: String,
    trade_limit: u32,
}

impl OkxAdapter {
    pub fn new(base_url: &str, aggregation: &AggregationConfig, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: HttpSource::new(Exchange::Okx, "ok-access-key", timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            flow_symbol: aggregation.flow_symbol.to_uppercase(),
            trade_limit: aggregation.trade_limit.min(MAX_TRADES),
        })
    }

    /// "BTCUSDT" -> "BTC-USDT"
    fn spot_inst_id(symbol: &str) -> String {
        match split_usdt_pair(symbol) {
            Some((base, quote)) => format!("{}-{}", base, quote),
            None => symbol.to_uppercase(),
        }
    }

    /// "BTCUSDT" -> "BTC-USDT-SWAP"
    fn swap_inst_id(symbol: &str) -> String {
        format!("{}-SWAP", Self::spot_inst_id(symbol))
    }

    async fn get_data(&self, path: &str, query: &[(&str, String)]) -> Result<Vec<Value>, AdapterFailure> {
        let url = format!("{}{}", self.base_url, path);
        let envelope: Envelope = self.http.get_json(&url, query).await?;
        envelope.into_data()
    }

    async fn fetch_flow(&self, symbol: Option<&str>) -> Result<RawPayload, AdapterFailure> {
        let inst_id = Self::spot_inst_id(symbol.unwrap_or(&self.flow_symbol));

        let trades_query = [
            ("instId", inst_id.clone()),
            ("limit", self.trade_limit.to_string()),
        ];
        let ticker_query = [("instId", inst_id)];

        let (trades, tickers) = tokio::join!(
            self.get_data("/api/v5/market/trades", &trades_query),
            self.get_data("/api/v5/market/ticker", &ticker_query),
        );

        let ticker: Ticker = decode_rows(tickers?)
            .into_iter()
            .next()
            .ok_or_else(|| AdapterFailure::InvalidSchema("empty ticker data".to_string()))?;

        Ok(RawPayload::Trades {
            trades: decode_rows::<Trade>(trades?)
                .into_iter()
                .map(|t| RawTrade {
                    price: t.px,
                    size: t.sz,
                    side: t.side.map(TradeSide::TakerSide),
                })
                .collect(),
            // Spot: vol24h is base units, volCcy24h is quote units
            ticker: RawTicker {
                symbol: ticker.inst_id,
                last_price: ticker.last,
                base_volume: ticker.vol24h,
                quote_volume: ticker.vol_ccy24h,
                price_change: ticker.open24h.map(PriceChange::SinceOpen),
                ..Default::default()
            },
        })
    }

    async fn fetch_swap_tickers(&self, symbol: Option<&str>) -> Result<RawPayload, AdapterFailure> {
        let rows = match symbol {
            Some(symbol) => {
                self.get_data("/api/v5/market/ticker", &[("instId", Self::swap_inst_id(symbol))])
                    .await?
            }
            None => {
                self.get_data("/api/v5/market/tickers", &[("instType", "SWAP".to_string())])
                    .await?
            }
        };

        // Swap: vol24h is contracts, volCcy24h is base units
        Ok(RawPayload::Tickers(
            decode_rows::<Ticker>(rows)
                .into_iter()
                .map(|t| RawTicker {
                    symbol: t.inst_id,
                    last_price: t.last,
                    base_volume: t.vol_ccy24h,
                    price_change: t.open24h.map(PriceChange::SinceOpen),
                    ..Default::default()
                })
                .collect(),
        ))
    }

    async fn fetch_open_interest(&self, symbol: Option<&str>) -> Result<RawPayload, AdapterFailure> {
        let mut query = vec![("instType", "SWAP".to_string())];
        if let Some(symbol) = symbol {
            query.push(("instId", Self::swap_inst_id(symbol)));
        }
        let rows = self.get_data("/api/v5/public/open-interest", &query).await?;

        Ok(RawPayload::Tickers(
            decode_rows::<OpenInterest>(rows)
                .into_iter()
                .map(|oi| RawTicker {
                    symbol: oi.inst_id,
                    open_interest: oi.oi_ccy,
                    open_interest_value: oi.oi_usd,
                    ..Default::default()
                })
                .collect(),
        ))
    }
}

#[async_trait]
impl ExchangeAdapter for OkxAdapter {
    fn exchange(&self) -> Exchange {
        Exchange::Okx
    }

    fn supports(&self, kind: AggregationKind) -> bool {
        !matches!(kind, AggregationKind::FundingRate)
    }

    async fn fetch(
        &self,
        kind: AggregationKind,
        symbol_filter: Option<String>,
    ) -> Result<RawPayload, AdapterFailure> {
        let symbol = symbol_filter.as_deref();
        match kind {
            AggregationKind::FundFlow => self.fetch_flow(symbol).await,
            AggregationKind::Volume => self.fetch_swap_tickers(symbol).await,
            AggregationKind::OpenInterest => self.fetch_open_interest(symbol).await,
            AggregationKind::FundingRate => Err(AdapterFailure::UnsupportedKind(kind)),
        }
    }
}
