//! Bitget V2 mix-market adapter (USDT-margined futures)

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use crate::sources::{
    decode_rows, AdapterFailure, ExchangeAdapter, HttpSource, PriceChange, RawFundingRow,
    RawPayload, RawTicker,
};
use crate::types::{AggregationKind, Exchange};

const PRODUCT_TYPE: &str = "USDT-FUTURES";
const SUCCESS_CODE: &str = "00000";

#[derive(Debug, Deserialize)]
struct Envelope {
    code: Option<String>,
    msg: Option<String>,
    data: Option<Vec<Value>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ticker {
    symbol: Option<String>,
    last_pr: Option<Value>,
    funding_rate: Option<Value>,
    base_volume: Option<Value>,
    usdt_volume: Option<Value>,
    holding_amount: Option<Value>,
    change24h: Option<Value>,
}

pub struct BitgetAdapter {
    http: HttpSource,
    base_url: String,
}

impl BitgetAdapter {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: HttpSource::new(Exchange::Bitget, "access-key", timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn tickers(&self, symbol: Option<&str>) -> Result<Vec<Ticker>, AdapterFailure> {
        let mut query = vec![("productType", PRODUCT_TYPE.to_string())];
        let url = match symbol {
            Some(symbol) => {
                query.push(("symbol", symbol.to_uppercase()));
                format!("{}/api/v2/mix/market/ticker", self.base_url)
            }
            None => format!("{}/api/v2/mix/market/tickers", self.base_url),
        };

        let envelope: Envelope = self.http.get_json(&url, &query).await?;
        if let Some(code) = envelope.code.as_deref().filter(|c| *c != SUCCESS_CODE) {
            return Err(AdapterFailure::InvalidSchema(format!(
                "code {}: {}",
                code,
                envelope.msg.unwrap_or_default()
            )));
        }
        let rows = envelope
            .data
            .ok_or_else(|| AdapterFailure::InvalidSchema("missing data".to_string()))?;
        Ok(decode_rows(rows))
    }
}

#[async_trait]
impl ExchangeAdapter for BitgetAdapter {
    fn exchange(&self) -> Exchange {
        Exchange::Bitget
    }

    fn supports(&self, kind: AggregationKind) -> bool {
        !matches!(kind, AggregationKind::FundFlow)
    }

    async fn fetch(
        &self,
        kind: AggregationKind,
        symbol_filter: Option<String>,
    ) -> Result<RawPayload, AdapterFailure> {
        if !self.supports(kind) {
            return Err(AdapterFailure::UnsupportedKind(kind));
        }
        let tickers = self.tickers(symbol_filter.as_deref()).await?;

        Ok(match kind {
            AggregationKind::FundingRate => RawPayload::FundingRates(
                tickers
                    .into_iter()
                    .map(|t| RawFundingRow {
                        symbol: t.symbol,
                        rate: t.funding_rate,
                        interval_hours: Some(8),
                        quote_volume: t.usdt_volume,
                        open_interest_value: None,
                    })
                    .collect(),
            ),
            _ => RawPayload::Tickers(
                tickers
                    .into_iter()
                    .map(|t| RawTicker {
                        symbol: t.symbol,
                        last_price: t.last_pr,
                        base_volume: t.base_volume,
                        quote_volume: t.usdt_volume,
                        open_interest: t.holding_amount,
                        open_interest_value: None,
                        price_change: t.change24h.map(PriceChange::Fraction),
                    })
                    .collect(),
            ),
        })
    }
}
