//! Dashboard API Types
//!
//! Wire DTOs for the aggregate endpoints. Field names are camelCase for
//! the browser frontend; rows are built from a cached `AggregateResult`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::aggregation::{AggregateResult, NormalizeStats, Summary};
use crate::types::{Exchange, ExchangeQuote};

/// Settlement interval most perpetuals use; anything else is flagged
pub const STANDARD_FUNDING_INTERVAL_HOURS: u32 = 8;

// ─────────────────────────────────────────────────────────────────
// Envelopes
// ─────────────────────────────────────────────────────────────────

/// Generic API response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

/// Body of every aggregate route
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateResponse<R> {
    pub success: bool,
    pub data: Vec<R>,
    pub summary: SummaryResponse,
    /// Exchange name -> reason code
    pub failures: BTreeMap<String, String>,
    /// Aggregate generation time, epoch ms
    pub timestamp: i64,
}

impl<R> AggregateResponse<R> {
    pub fn new(result: &AggregateResult, data: Vec<R>, summary: SummaryResponse) -> Self {
        Self {
            success: true,
            data,
            summary,
            failures: result.failure_reasons(),
            timestamp: result.generated_at.timestamp_millis(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SummaryResponse {
    #[serde(rename_all = "camelCase")]
    FundFlow {
        total_inflow: f64,
        total_outflow: f64,
        total_net_flow: f64,
    },
    #[serde(rename_all = "camelCase")]
    FundingRate { count: usize, mean_rate: f64 },
    #[serde(rename_all = "camelCase")]
    Volume { total_volume: f64 },
    #[serde(rename_all = "camelCase")]
    OpenInterest { total_open_interest: f64 },
}

impl From<&Summary> for SummaryResponse {
    fn from(summary: &Summary) -> Self {
        match *summary {
            Summary::FundFlow {
                total_inflow,
                total_outflow,
                total_net_flow,
            } => SummaryResponse::FundFlow {
                total_inflow,
                total_outflow,
                total_net_flow,
            },
            Summary::FundingRate { count, mean_rate } => {
                SummaryResponse::FundingRate { count, mean_rate }
            }
            Summary::Volume { total_volume } => SummaryResponse::Volume { total_volume },
            Summary::OpenInterest {
                total_open_interest,
            } => SummaryResponse::OpenInterest {
                total_open_interest,
            },
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Rows
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundingRateRow {
    pub exchange: String,
    pub symbol: String,
    /// Fraction per settlement (0.0001 = 0.01%)
    pub current_rate: f64,
    /// Hours between settlements
    pub settlement_interval: u32,
    pub is_special_interval: bool,
}

impl From<&ExchangeQuote> for FundingRateRow {
    fn from(quote: &ExchangeQuote) -> Self {
        let interval = quote
            .settlement_interval_hours
            .unwrap_or(STANDARD_FUNDING_INTERVAL_HOURS);
        Self {
            exchange: quote.exchange.to_string(),
            symbol: quote.symbol.clone(),
            current_rate: quote.metric_value,
            settlement_interval: interval,
            is_special_interval: interval != STANDARD_FUNDING_INTERVAL_HOURS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundFlowRow {
    pub exchange: String,
    pub inflow: f64,
    pub outflow: f64,
    pub net_flow: f64,
    pub change_24h: Option<f64>,
    pub market_share: Option<f64>,
    /// Trade-tape bookkeeping (large orders, skipped rows, gross notional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<NormalizeStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeRow {
    pub exchange: String,
    pub volume_24h: f64,
    pub market_share: Option<f64>,
    pub instruments: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenInterestRow {
    pub exchange: String,
    pub open_interest: f64,
    pub market_share: Option<f64>,
    pub instruments: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub cached_kinds: Vec<String>,
}

// ─────────────────────────────────────────────────────────────────
// Builders
// ─────────────────────────────────────────────────────────────────

fn share(part: f64, total: f64) -> Option<f64> {
    (total > 0.0).then(|| part / total)
}

/// Funding rows, optionally limited to one base asset.
///
/// With a filter the summary covers only the matching rows.
pub fn funding_rate_response(
    result: &AggregateResult,
    symbol: Option<&str>,
) -> AggregateResponse<FundingRateRow> {
    let quotes: Vec<ExchangeQuote> = result
        .quotes
        .iter()
        .filter(|q| symbol.map_or(true, |s| q.symbol == s))
        .cloned()
        .collect();
    let summary = match symbol {
        Some(_) => Summary::compute(result.kind, &quotes),
        None => result.summary.clone(),
    };
    let rows = quotes.iter().map(FundingRateRow::from).collect();
    AggregateResponse::new(result, rows, SummaryResponse::from(&summary))
}

/// One row per flow quote; inflow/outflow split the net so rows add up
/// to the summary totals
pub fn fund_flow_response(result: &AggregateResult) -> AggregateResponse<FundFlowRow> {
    let total_volume: f64 = result.quotes.iter().filter_map(|q| q.volume_24h).sum();
    let rows = result
        .quotes
        .iter()
        .map(|q| FundFlowRow {
            exchange: q.exchange.to_string(),
            inflow: q.metric_value.max(0.0),
            outflow: (-q.metric_value).max(0.0),
            net_flow: q.metric_value,
            change_24h: q.price_change_24h,
            market_share: q.volume_24h.and_then(|v| share(v, total_volume)),
            diagnostics: result.diagnostics.get(&q.exchange).cloned(),
        })
        .collect();
    AggregateResponse::new(result, rows, SummaryResponse::from(&result.summary))
}

/// Exchange -> (summed metric, instrument count), every succeeding
/// source included even when it returned no rows
fn per_exchange_totals(result: &AggregateResult) -> BTreeMap<Exchange, (f64, usize)> {
    let mut totals: BTreeMap<Exchange, (f64, usize)> =
        result.sources.iter().map(|e| (*e, (0.0, 0))).collect();
    for quote in &result.quotes {
        let entry = totals.entry(quote.exchange).or_insert((0.0, 0));
        entry.0 += quote.metric_value;
        entry.1 += 1;
    }
    totals
}

pub fn volume_response(result: &AggregateResult) -> AggregateResponse<VolumeRow> {
    let totals = per_exchange_totals(result);
    let grand: f64 = totals.values().map(|(v, _)| v).sum();
    let rows = totals
        .into_iter()
        .map(|(exchange, (volume, instruments))| VolumeRow {
            exchange: exchange.to_string(),
            volume_24h: volume,
            market_share: share(volume, grand),
            instruments,
        })
        .collect();
    AggregateResponse::new(result, rows, SummaryResponse::from(&result.summary))
}

pub fn open_interest_response(result: &AggregateResult) -> AggregateResponse<OpenInterestRow> {
    let totals = per_exchange_totals(result);
    let grand: f64 = totals.values().map(|(v, _)| v).sum();
    let rows = totals
        .into_iter()
        .map(|(exchange, (open_interest, instruments))| OpenInterestRow {
            exchange: exchange.to_string(),
            open_interest,
            market_share: share(open_interest, grand),
            instruments,
        })
        .collect();
    AggregateResponse::new(result, rows, SummaryResponse::from(&result.summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::AdapterFailure;
    use crate::types::AggregationKind;
    use serde_json::json;

    fn result_with(kind: AggregationKind, quotes: Vec<ExchangeQuote>) -> AggregateResult {
        let mut result = AggregateResult::empty(kind);
        for q in &quotes {
            if !result.sources.contains(&q.exchange) {
                result.sources.push(q.exchange);
            }
        }
        result.summary = Summary::compute(kind, &quotes);
        result.quotes = quotes;
        result
    }

    #[test]
    fn funding_rows_flag_special_intervals_and_filter_by_symbol() {
        let mut btc = ExchangeQuote::new(Exchange::Binance, "BTC", 0.0001);
        btc.settlement_interval_hours = Some(8);
        let mut eth = ExchangeQuote::new(Exchange::Bybit, "ETH", 0.0004);
        eth.settlement_interval_hours = Some(4);
        let result = result_with(AggregationKind::FundingRate, vec![btc, eth]);

        let all = funding_rate_response(&result, None);
        assert_eq!(all.data.len(), 2);
        assert!(!all.data[0].is_special_interval);
        assert!(all.data[1].is_special_interval);

        let only_eth = funding_rate_response(&result, Some("ETH"));
        assert_eq!(only_eth.data.len(), 1);
        assert_eq!(
            only_eth.summary,
            SummaryResponse::FundingRate {
                count: 1,
                mean_rate: 0.0004
            }
        );
    }

    #[test]
    fn flow_rows_sum_to_summary_and_carry_market_share() {
        let mut binance = ExchangeQuote::new(Exchange::Binance, "BTC", 300.0);
        binance.volume_24h = Some(750.0);
        binance.price_change_24h = Some(0.02);
        let mut okx = ExchangeQuote::new(Exchange::Okx, "BTC", -100.0);
        okx.volume_24h = Some(250.0);
        let result = result_with(AggregationKind::FundFlow, vec![binance, okx]);

        let body = fund_flow_response(&result);
        let inflow: f64 = body.data.iter().map(|r| r.inflow).sum();
        let outflow: f64 = body.data.iter().map(|r| r.outflow).sum();
        assert_eq!(
            body.summary,
            SummaryResponse::FundFlow {
                total_inflow: inflow,
                total_outflow: outflow,
                total_net_flow: inflow - outflow
            }
        );
        assert_eq!(body.data[0].market_share, Some(0.75));
        assert_eq!(body.data[0].change_24h, Some(0.02));
        assert_eq!(body.data[1].change_24h, None);
    }

    #[test]
    fn volume_rows_group_by_exchange() {
        let result = result_with(
            AggregationKind::Volume,
            vec![
                ExchangeQuote::new(Exchange::Bybit, "BTC", 60.0),
                ExchangeQuote::new(Exchange::Bybit, "ETH", 20.0),
                ExchangeQuote::new(Exchange::Bitget, "BTC", 20.0),
            ],
        );

        let body = volume_response(&result);
        assert_eq!(body.data.len(), 2);
        let bybit = body.data.iter().find(|r| r.exchange == "Bybit").unwrap();
        assert_eq!(bybit.volume_24h, 80.0);
        assert_eq!(bybit.instruments, 2);
        assert_eq!(bybit.market_share, Some(0.8));
    }

    #[test]
    fn wire_format_uses_camel_case_and_reason_codes() {
        let mut result = result_with(
            AggregationKind::OpenInterest,
            vec![ExchangeQuote::new(Exchange::Okx, "BTC", 5.0)],
        );
        result.failures.insert(Exchange::Bybit, AdapterFailure::Http(503));

        let value = serde_json::to_value(open_interest_response(&result)).unwrap();
        assert_eq!(value["success"], json!(true));
        assert_eq!(value["data"][0]["openInterest"], json!(5.0));
        assert_eq!(value["data"][0]["marketShare"], json!(1.0));
        assert_eq!(value["summary"]["totalOpenInterest"], json!(5.0));
        assert_eq!(value["failures"]["Bybit"], json!("http_5xx"));
        assert!(value["timestamp"].is_i64());

        let back: AggregateResponse<OpenInterestRow> = serde_json::from_value(value).unwrap();
        assert_eq!(back.data[0].exchange, "OKX");
    }

    fn summary_values(summary: &SummaryResponse) -> Vec<f64> {
        match *summary {
            SummaryResponse::FundFlow {
                total_inflow,
                total_outflow,
                total_net_flow,
            } => vec![total_inflow, total_outflow, total_net_flow],
            SummaryResponse::FundingRate { count, mean_rate } => vec![count as f64, mean_rate],
            SummaryResponse::Volume { total_volume } => vec![total_volume],
            SummaryResponse::OpenInterest {
                total_open_interest,
            } => vec![total_open_interest],
        }
    }

    fn assert_same_summary(back: &SummaryResponse, original: &Summary) {
        let expected = SummaryResponse::from(original);
        assert_eq!(
            std::mem::discriminant(back),
            std::mem::discriminant(&expected),
            "summary decoded as {:?}",
            back
        );
        for (got, want) in summary_values(back).iter().zip(summary_values(&expected)) {
            assert!((got - want).abs() <= want.abs() * 1e-12, "{} != {}", got, want);
        }
    }

    #[test]
    fn funding_response_round_trips_through_json() {
        let mut btc = ExchangeQuote::new(Exchange::Binance, "BTC", 0.0001);
        btc.settlement_interval_hours = Some(8);
        let mut trb = ExchangeQuote::new(Exchange::Binance, "TRB", -0.0025);
        trb.settlement_interval_hours = Some(4);
        let eth = ExchangeQuote::new(Exchange::Bybit, "ETH", 0.00037);
        let result = result_with(AggregationKind::FundingRate, vec![btc, trb, eth]);

        let json = serde_json::to_string(&funding_rate_response(&result, None)).unwrap();
        let back: AggregateResponse<FundingRateRow> = serde_json::from_str(&json).unwrap();

        assert_eq!(back.data.len(), result.quotes.len());
        assert_same_summary(&back.summary, &result.summary);
        assert_eq!(back.timestamp, result.generated_at.timestamp_millis());
    }

    #[test]
    fn fund_flow_response_round_trips_through_json() {
        let mut binance = ExchangeQuote::new(Exchange::Binance, "BTC", 123_456.789);
        binance.volume_24h = Some(9.5e8);
        let bybit = ExchangeQuote::new(Exchange::Bybit, "BTC", -45_678.9);
        let okx = ExchangeQuote::new(Exchange::Okx, "BTC", 0.0);
        let mut result = result_with(AggregationKind::FundFlow, vec![binance, bybit, okx]);
        result.diagnostics.insert(
            Exchange::Binance,
            NormalizeStats {
                rows_accepted: 998,
                rows_skipped: 2,
                large_orders: 3,
                buy_notional: 400_000.0,
                sell_notional: 276_543.211,
            },
        );
        result.failures.insert(
            Exchange::Bitget,
            AdapterFailure::UnsupportedKind(AggregationKind::FundFlow),
        );

        let json = serde_json::to_string(&fund_flow_response(&result)).unwrap();
        let back: AggregateResponse<FundFlowRow> = serde_json::from_str(&json).unwrap();

        assert_eq!(back.data.len(), result.quotes.len());
        assert_same_summary(&back.summary, &result.summary);
        assert_eq!(
            back.failures.get("Bitget").map(String::as_str),
            Some("unsupported_kind")
        );
        let stats = back.data[0].diagnostics.as_ref().unwrap();
        assert_eq!(stats.large_orders, 3);
        assert!(back.data[1].diagnostics.is_none());
    }

    #[test]
    fn volume_response_round_trips_through_json() {
        let result = result_with(
            AggregationKind::Volume,
            vec![
                ExchangeQuote::new(Exchange::Bitget, "BTC", 2.5e9),
                ExchangeQuote::new(Exchange::Okx, "ETH", 1.25e9),
            ],
        );

        let json = serde_json::to_string(&volume_response(&result)).unwrap();
        let back: AggregateResponse<VolumeRow> = serde_json::from_str(&json).unwrap();

        let instruments: usize = back.data.iter().map(|r| r.instruments).sum();
        assert_eq!(instruments, result.quotes.len());
        assert_same_summary(&back.summary, &result.summary);
    }

    #[test]
    fn error_envelope_omits_data() {
        let value = serde_json::to_value(ApiResponse::<()>::error("nope")).unwrap();
        assert_eq!(value, json!({"success": false, "error": "nope"}));
    }
}
