//! Bybit V5 REST adapter
//!
//! Linear (USDT perpetual) tickers carry funding rate, turnover and open
//! interest in one list; fund flow uses the spot trade tape.

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use crate::config::AggregationConfig;
use crate::sources::{
    decode_rows, AdapterFailure, ExchangeAdapter, HttpSource, PriceChange, RawFundingRow,
    RawPayload, RawTicker, RawTrade, TradeSide,
};
use crate::types::{AggregationKind, Exchange};

/// Spot recent-trade limit accepted by Bybit
const MAX_SPOT_TRADES: u32 = 60;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    ret_code: Option<i64>,
    ret_msg: Option<String>,
    result: Option<ResultList>,
}

#[derive(Debug, Deserialize)]
struct ResultList {
    list: Option<Vec<Value>>,
}

impl Envelope {
    fn into_list(self) -> Result<Vec<Value>, AdapterFailure> {
        if let Some(code) = self.ret_code.filter(|c| *c != 0) {
            return Err(AdapterFailure::InvalidSchema(format!(
                "retCode {}: {}",
                code,
                self.ret_msg.unwrap_or_default()
            )));
        }
        self.result
            .and_then(|r| r.list)
            .ok_or_else(|| AdapterFailure::InvalidSchema("missing result.list".to_string()))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ticker {
    symbol: Option<String>,
    last_price: Option<Value>,
    funding_rate: Option<Value>,
    funding_interval_hour: Option<Value>,
    volume24h: Option<Value>,
    turnover24h: Option<Value>,
    open_interest: Option<Value>,
    open_interest_value: Option<Value>,
    price24h_pcnt: Option<Value>,
}

impl Ticker {
    fn interval_hours(&self) -> Option<u32> {
        match self.funding_interval_hour.as_ref()? {
            Value::String(s) => s.trim().parse().ok(),
            Value::Number(n) => n.as_u64().and_then(|h| u32::try_from(h).ok()),
            _ => None,
        }
    }
}

impl From<Ticker> for RawTicker {
    fn from(t: Ticker) -> Self {
        RawTicker {
            symbol: t.symbol,
            last_price: t.last_price,
            base_volume: t.volume24h,
            quote_volume: t.turnover24h,
            open_interest: t.open_interest,
            open_interest_value: t.open_interest_value,
            price_change: t.price24h_pcnt.map(PriceChange::Fraction),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct Trade {
    price: Option<Value>,
    size: Option<Value>,
    side: Option<String>,
}

impl From<Trade> for RawTrade {
    fn from(t: Trade) -> Self {
        RawTrade {
            price: t.price,
            size: t.size,
            side: t.side.map(TradeSide::CounterSide),
        }
    }
}

pub struct BybitAdapter {
    http: HttpSource,
    base_url: String,
    flow_symbol: String,
    trade_limit: u32,
}

impl BybitAdapter {
    pub fn new(base_url: &str, aggregation: &AggregationConfig, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: HttpSource::new(Exchange::Bybit, "x-bapi-api-key", timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            flow_symbol: aggregation.flow_symbol.to_uppercase(),
            trade_limit: aggregation.trade_limit.min(MAX_SPOT_TRADES),
        })
    }

    async fn tickers(&self, category: &str, symbol: Option<&str>) -> Result<Vec<Ticker>, AdapterFailure> {
        let url = format!("{}/v5/market/tickers", self.base_url);
        let mut query = vec![("category", category.to_string())];
        if let Some(symbol) = symbol {
            query.push(("symbol", symbol.to_uppercase()));
        }
        let envelope: Envelope = self.http.get_json(&url, &query).await?;
        Ok(decode_rows(envelope.into_list()?))
    }

    async fn fetch_funding(&self, symbol: Option<&str>) -> Result<RawPayload, AdapterFailure> {
        let tickers = self.tickers("linear", symbol).await?;
        Ok(RawPayload::FundingRates(
            tickers
                .into_iter()
                .map(|t| {
                    let interval = t.interval_hours();
                    RawFundingRow {
                        symbol: t.symbol,
                        rate: t.funding_rate,
                        interval_hours: interval.or(Some(8)),
                        quote_volume: t.turnover24h,
                        open_interest_value: t.open_interest_value,
                    }
                })
                .collect(),
        ))
    }

    async fn fetch_flow(&self, symbol: Option<&str>) -> Result<RawPayload, AdapterFailure> {
        let symbol = symbol.unwrap_or(&self.flow_symbol).to_uppercase();
        let trades_url = format!("{}/v5/market/recent-trade", self.base_url);

        let trades_query = [
            ("category", "spot".to_string()),
            ("symbol", symbol.clone()),
            ("limit", self.trade_limit.to_string()),
        ];

        let (trades, tickers) = tokio::join!(
            self.http.get_json::<Envelope>(&trades_url, &trades_query),
            self.tickers("spot", Some(&symbol)),
        );

        let ticker = tickers?
            .into_iter()
            .next()
            .ok_or_else(|| AdapterFailure::InvalidSchema("empty spot ticker list".to_string()))?;

        Ok(RawPayload::Trades {
            trades: decode_rows::<Trade>(trades?.into_list()?)
                .into_iter()
                .map(RawTrade::from)
                .collect(),
            ticker: ticker.into(),
        })
    }
}

#[async_trait]
impl ExchangeAdapter for BybitAdapter {
    fn exchange(&self) -> Exchange {
        Exchange::Bybit
    }

    fn supports(&self, _kind: AggregationKind) -> bool {
        true
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
            AggregationKind::Volume | AggregationKind::OpenInterest => Ok(RawPayload::Tickers(
                self.tickers("linear", symbol)
                    .await?
                    .into_iter()
                    .map(RawTicker::from)
                    .collect(),
            )),
        }
    }
}
