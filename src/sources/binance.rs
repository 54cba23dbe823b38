//! Binance REST adapter
//!
//! Funding rates and perpetual tickers come from the USDⓈ-M futures API,
//! fund flow from the spot trade tape and spot 24h ticker.

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

use crate::config::AggregationConfig;
use crate::sources::{
    decode_rows, AdapterFailure, ExchangeAdapter, HttpSource, OneOrMany, PriceChange,
    RawFundingRow, RawPayload, RawTicker, RawTrade, TradeSide,
};
use crate::types::{AggregationKind, Exchange};

const MAX_TRADES: u32 = 1000;
const DEFAULT_FUNDING_INTERVAL_HOURS: u32 = 8;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PremiumIndex {
    symbol: Option<String>,
    last_funding_rate: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FundingInfo {
    symbol: String,
    funding_interval_hours: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpotTrade {
    price: Option<Value>,
    qty: Option<Value>,
    is_buyer_maker: Option<bool>,
    /// Present on account trade lists; takes precedence when set
    is_buyer: Option<bool>,
}

impl From<SpotTrade> for RawTrade {
    fn from(trade: SpotTrade) -> Self {
        let buyer_is_taker = trade.is_buyer.or(trade.is_buyer_maker.map(|maker| !maker));
        RawTrade {
            price: trade.price,
            size: trade.qty,
            side: buyer_is_taker.map(TradeSide::BuyerIsTaker),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ticker24h {
    symbol: Option<String>,
    last_price: Option<Value>,
    volume: Option<Value>,
    quote_volume: Option<Value>,
    price_change_percent: Option<Value>,
}

impl From<Ticker24h> for RawTicker {
    fn from(t: Ticker24h) -> Self {
        RawTicker {
            symbol: t.symbol,
            last_price: t.last_price,
            base_volume: t.volume,
            quote_volume: t.quote_volume,
            price_change: t.price_change_percent.map(PriceChange::Percent),
            ..Default::default()
        }
    }
}

pub struct BinanceAdapter {
    http: HttpSource,
    spot_url: String,
    futures_url: String,
    flow_symbol: String,
    trade_limit: u32,
}

impl BinanceAdapter {
    pub fn new(
        spot_url: &str,
        futures_url: &str,
        aggregation: &AggregationConfig,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            http: HttpSource::new(Exchange::Binance, "x-mbx-apikey", timeout)?,
            spot_url: spot_url.trim_end_matches('/').to_string(),
            futures_url: futures_url.trim_end_matches('/').to_string(),
            flow_symbol: aggregation.flow_symbol.to_uppercase(),
            trade_limit: aggregation.trade_limit.min(MAX_TRADES),
        })
    }

    fn symbol_query(symbol: Option<&str>) -> Vec<(&'static str, String)> {
        symbol
            .map(|s| vec![("symbol", s.to_uppercase())])
            .unwrap_or_default()
    }

    async fn fetch_funding(&self, symbol: Option<&str>) -> Result<RawPayload, AdapterFailure> {
        let index_url = format!("{}/fapi/v1/premiumIndex", self.futures_url);
        let info_url = format!("{}/fapi/v1/fundingInfo", self.futures_url);
        let query = Self::symbol_query(symbol);
        let info_query: [(&str, String); 0] = [];

        let (index, info) = tokio::join!(
            self.http.get_json::<OneOrMany<Value>>(&index_url, &query),
            self.http.get_json::<Vec<Value>>(&info_url, &info_query),
        );
        let rows: Vec<PremiumIndex> = decode_rows(index?.into_rows("symbol")?);

        // fundingInfo only lists symbols with a non-default interval
        let intervals: HashMap<String, u32> = match info {
            Ok(list) => decode_rows::<FundingInfo>(list)
                .into_iter()
                .filter_map(|i| Some((i.symbol, i.funding_interval_hours?)))
                .collect(),
            Err(e) => {
                tracing::debug!(exchange = "Binance", error = %e, "fundingInfo unavailable, assuming 8h");
                HashMap::new()
            }
        };

        Ok(RawPayload::FundingRates(
            rows.into_iter()
                .map(|row| {
                    let interval = row
                        .symbol
                        .as_ref()
                        .and_then(|s| intervals.get(s).copied())
                        .unwrap_or(DEFAULT_FUNDING_INTERVAL_HOURS);
                    RawFundingRow {
                        symbol: row.symbol,
                        rate: row.last_funding_rate,
                        interval_hours: Some(interval),
                        ..Default::default()
                    }
                })
                .collect(),
        ))
    }

    async fn fetch_flow(&self, symbol: Option<&str>) -> Result<RawPayload, AdapterFailure> {
        let symbol = symbol.unwrap_or(&self.flow_symbol).to_uppercase();
        let trades_url = format!("{}/api/v3/trades", self.spot_url);
        let ticker_url = format!("{}/api/v3/ticker/24hr", self.spot_url);

        let trades_query = [
            ("symbol", symbol.clone()),
            ("limit", self.trade_limit.to_string()),
        ];
        let ticker_query = [("symbol", symbol)];

        let (trades, ticker) = tokio::join!(
            self.http.get_json::<Vec<Value>>(&trades_url, &trades_query),
            self.http.get_json::<Ticker24h>(&ticker_url, &ticker_query),
        );

        Ok(RawPayload::Trades {
            trades: decode_rows::<SpotTrade>(trades?)
                .into_iter()
                .map(RawTrade::from)
                .collect(),
            ticker: ticker?.into(),
        })
    }

    async fn fetch_futures_tickers(&self, symbol: Option<&str>) -> Result<RawPayload, AdapterFailure> {
        let url = format!("{}/fapi/v1/ticker/24hr", self.futures_url);
        let tickers = self
            .http
            .get_json::<OneOrMany<Value>>(&url, &Self::symbol_query(symbol))
            .await?;

        Ok(RawPayload::Tickers(
            decode_rows::<Ticker24h>(tickers.into_rows("symbol")?)
                .into_iter()
                .map(RawTicker::from)
                .collect(),
        ))
    }
}

#[async_trait]
impl ExchangeAdapter for BinanceAdapter {
    fn exchange(&self) -> Exchange {
        Exchange::Binance
    }

    fn supports(&self, kind: AggregationKind) -> bool {
        // No bulk open-interest endpoint on Binance futures
        !matches!(kind, AggregationKind::OpenInterest)
    }

    async fn fetch(
        &self,
        kind: AggregationKind,
        symbol_filter: Option<String>,
    ) -> Result<RawPayload, AdapterFailure> {
        let symbol = symbol_filter.as_deref();
        match kind {
            AggregationKind::FundingRate => self.fetch_funding(symbol).await,
            AggregationKind::FundFlow => self.fetch_flow(symbol).await,
            AggregationKind::Volume => self.fetch_futures_tickers(symbol).await,
            AggregationKind::OpenInterest => Err(AdapterFailure::UnsupportedKind(kind)),
        }
    }
}
