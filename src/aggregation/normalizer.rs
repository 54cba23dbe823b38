//! Normalizer - reduces exchange payloads to `ExchangeQuote`s
//!
//! Parses string-or-number fields, strips quote suffixes, converts units
//! and applies each exchange's trade-direction convention. Rows that
//! cannot produce a finite value are skipped and counted; they never
//! abort the rest of the payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::sources::{
    AdapterFailure, PriceChange, RawFundingRow, RawPayload, RawTicker, RawTrade, TradeSide,
};
use crate::types::{AggregationKind, Exchange, ExchangeQuote};

/// Default notional (quote units) at which a trade counts as large
pub const DEFAULT_LARGE_ORDER_THRESHOLD: f64 = 100_000.0;

#[derive(Debug, Clone, Copy)]
pub struct NormalizerSettings {
    pub large_order_threshold: f64,
}

impl Default for NormalizerSettings {
    fn default() -> Self {
        Self {
            large_order_threshold: DEFAULT_LARGE_ORDER_THRESHOLD,
        }
    }
}

/// Per-exchange bookkeeping for one normalization pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizeStats {
    pub rows_accepted: usize,
    pub rows_skipped: usize,
    /// Trades with |notional| at or above the large-order threshold
    pub large_orders: usize,
    /// Gross taker-buy notional
    pub buy_notional: f64,
    /// Gross taker-sell notional
    pub sell_notional: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Normalized {
    pub quotes: Vec<ExchangeQuote>,
    pub stats: NormalizeStats,
}

/// Normalize one adapter payload for `kind`
pub fn normalize(
    exchange: Exchange,
    raw: RawPayload,
    kind: AggregationKind,
    settings: &NormalizerSettings,
    observed_at: DateTime<Utc>,
) -> Result<Normalized, AdapterFailure> {
    match (kind, raw) {
        (AggregationKind::FundingRate, RawPayload::FundingRates(rows)) => {
            Ok(normalize_funding(exchange, rows, observed_at))
        }
        (AggregationKind::FundFlow, RawPayload::Trades { trades, ticker }) => {
            normalize_flow(exchange, &trades, &ticker, settings, observed_at)
        }
        (AggregationKind::Volume, RawPayload::Tickers(tickers)) => {
            Ok(normalize_tickers(exchange, tickers, kind, observed_at))
        }
        (AggregationKind::OpenInterest, RawPayload::Tickers(tickers)) => {
            Ok(normalize_tickers(exchange, tickers, kind, observed_at))
        }
        (kind, raw) => Err(AdapterFailure::InvalidSchema(format!(
            "{} payload with {} rows cannot produce {}",
            payload_name(&raw),
            raw.len(),
            kind
        ))),
    }
}

fn payload_name(raw: &RawPayload) -> &'static str {
    match raw {
        RawPayload::FundingRates(_) => "funding",
        RawPayload::Trades { .. } => "trades",
        RawPayload::Tickers(_) => "ticker",
    }
}

/// Parse a finite number sent either as a JSON string or a JSON number
pub fn parse_number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        Value::Number(n) => n.as_f64()?,
        _ => return None,
    };
    parsed.is_finite().then_some(parsed)
}

fn parse_opt(value: Option<&Value>) -> Option<f64> {
    value.and_then(parse_number)
}

fn non_negative(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v >= 0.0)
}

/// "BTCUSDT" / "BTC-USDT" / "BTC-USDT-SWAP" -> "BTC"; None when the
/// instrument is not USDT-quoted.
pub fn strip_quote_suffix(symbol: &str) -> Option<String> {
    let upper = symbol.trim().to_uppercase();
    let mut instrument = upper.as_str();
    for contract_suffix in ["-SWAP", "_UMCBL"] {
        if let Some(stripped) = instrument.strip_suffix(contract_suffix) {
            instrument = stripped;
        }
    }

    let base = instrument
        .strip_suffix("-USDT")
        .or_else(|| instrument.strip_suffix("USDT"))?;

    if base.is_empty() || !base.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(base.to_string())
}

fn normalize_funding(
    exchange: Exchange,
    rows: Vec<RawFundingRow>,
    observed_at: DateTime<Utc>,
) -> Normalized {
    let mut out = Normalized::default();

    for row in rows {
        let symbol = row.symbol.as_deref().and_then(strip_quote_suffix);
        let rate = parse_opt(row.rate.as_ref());

        let (Some(symbol), Some(rate)) = (symbol, rate) else {
            out.stats.rows_skipped += 1;
            continue;
        };

        // The rate stays a fraction; percent formatting is the client's job
        out.quotes.push(ExchangeQuote {
            exchange,
            symbol,
            metric_value: rate,
            volume_24h: non_negative(parse_opt(row.quote_volume.as_ref())),
            open_interest: non_negative(parse_opt(row.open_interest_value.as_ref())),
            price_change_24h: None,
            settlement_interval_hours: row.interval_hours,
            observed_at,
        });
        out.stats.rows_accepted += 1;
    }

    out
}

/// +1 for taker buys, -1 for taker sells, per exchange convention
fn trade_sign(side: &TradeSide) -> Option<f64> {
    match side {
        TradeSide::BuyerIsTaker(true) => Some(1.0),
        TradeSide::BuyerIsTaker(false) => Some(-1.0),
        // The side names the counter side: "sell" is a buy-side inflow
        TradeSide::CounterSide(side) => match side.to_lowercase().as_str() {
            "sell" => Some(1.0),
            "buy" => Some(-1.0),
            _ => None,
        },
        TradeSide::TakerSide(side) => match side.to_lowercase().as_str() {
            "buy" => Some(1.0),
            "sell" => Some(-1.0),
            _ => None,
        },
    }
}

/// Signed notional of a trade, None for malformed rows
fn signed_notional(trade: &RawTrade) -> Option<f64> {
    let price = parse_opt(trade.price.as_ref()).filter(|p| *p > 0.0)?;
    let size = parse_opt(trade.size.as_ref()).filter(|s| *s > 0.0)?;
    let sign = trade.side.as_ref().and_then(trade_sign)?;
    let notional = price * size;
    notional.is_finite().then_some(sign * notional)
}

/// Net taker flow over `trades` and the resulting bookkeeping
pub fn net_flow(trades: &[RawTrade], large_order_threshold: f64) -> (f64, NormalizeStats) {
    let mut stats = NormalizeStats::default();
    let mut net = 0.0;

    for trade in trades {
        let Some(signed) = signed_notional(trade) else {
            stats.rows_skipped += 1;
            continue;
        };

        if signed.abs() >= large_order_threshold {
            stats.large_orders += 1;
        }
        if signed > 0.0 {
            stats.buy_notional += signed;
        } else {
            stats.sell_notional -= signed;
        }
        net += signed;
        stats.rows_accepted += 1;
    }

    (net, stats)
}

fn normalize_flow(
    exchange: Exchange,
    trades: &[RawTrade],
    ticker: &RawTicker,
    settings: &NormalizerSettings,
    observed_at: DateTime<Utc>,
) -> Result<Normalized, AdapterFailure> {
    let symbol = ticker
        .symbol
        .as_deref()
        .and_then(strip_quote_suffix)
        .ok_or_else(|| AdapterFailure::InvalidSchema("ticker without USDT symbol".to_string()))?;

    let (net, stats) = net_flow(trades, settings.large_order_threshold);

    let mut quotes = Vec::with_capacity(1);
    if net.is_finite() {
        quotes.push(ExchangeQuote {
            exchange,
            symbol,
            metric_value: net,
            volume_24h: ticker_quote_volume(ticker),
            open_interest: None,
            price_change_24h: ticker_price_change(ticker),
            settlement_interval_hours: None,
            observed_at,
        });
    }

    Ok(Normalized { quotes, stats })
}

fn normalize_tickers(
    exchange: Exchange,
    tickers: Vec<RawTicker>,
    kind: AggregationKind,
    observed_at: DateTime<Utc>,
) -> Normalized {
    let mut out = Normalized::default();

    for ticker in tickers {
        let symbol = ticker.symbol.as_deref().and_then(strip_quote_suffix);
        let volume = ticker_quote_volume(&ticker);
        let open_interest = ticker_open_interest(&ticker);
        let metric = match kind {
            AggregationKind::OpenInterest => open_interest,
            _ => volume,
        };

        let (Some(symbol), Some(metric)) = (symbol, metric) else {
            out.stats.rows_skipped += 1;
            continue;
        };

        out.quotes.push(ExchangeQuote {
            exchange,
            symbol,
            metric_value: metric,
            volume_24h: volume,
            open_interest,
            price_change_24h: ticker_price_change(&ticker),
            settlement_interval_hours: None,
            observed_at,
        });
        out.stats.rows_accepted += 1;
    }

    out
}

/// Quote-currency 24h volume: direct, or base volume x last price
fn ticker_quote_volume(ticker: &RawTicker) -> Option<f64> {
    let direct = parse_opt(ticker.quote_volume.as_ref());
    let derived = || {
        let base = parse_opt(ticker.base_volume.as_ref())?;
        let last = parse_opt(ticker.last_price.as_ref())?;
        Some(base * last).filter(|v| v.is_finite())
    };
    non_negative(direct.or_else(derived))
}

/// Quote-currency open interest: direct, or base open interest x last price
fn ticker_open_interest(ticker: &RawTicker) -> Option<f64> {
    let direct = parse_opt(ticker.open_interest_value.as_ref());
    let derived = || {
        let base = parse_opt(ticker.open_interest.as_ref())?;
        let last = parse_opt(ticker.last_price.as_ref())?;
        Some(base * last).filter(|v| v.is_finite())
    };
    non_negative(direct.or_else(derived))
}

/// 24h price change as a fraction
fn ticker_price_change(ticker: &RawTicker) -> Option<f64> {
    let change = match ticker.price_change.as_ref()? {
        PriceChange::Percent(v) => parse_number(v)? / 100.0,
        PriceChange::Fraction(v) => parse_number(v)?,
        PriceChange::SinceOpen(open) => {
            let open = parse_number(open).filter(|o| *o > 0.0)?;
            let last = parse_opt(ticker.last_price.as_ref())?;
            (last - open) / open
        }
    };
    change.is_finite().then_some(change)
}
