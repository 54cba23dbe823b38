//! Aggregator - concurrent fan-out over exchange adapters
//!
//! Every adapter serving the requested kind runs at once; each is bounded
//! by the configured timeout so a slow exchange turns into a `timeout`
//! failure instead of stalling the cycle.

use chrono::Utc;
use futures_util::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::normalizer::{normalize, NormalizerSettings};
use super::{AggregateResult, Summary};
use crate::config::AggregationConfig;
use crate::sources::{AdapterFailure, ExchangeAdapter};
use crate::types::AggregationKind;

#[derive(Debug, Clone)]
pub struct AggregatorSettings {
    /// Upper bound for one adapter's whole fetch
    pub timeout: Duration,
    pub normalizer: NormalizerSettings,
    /// Restrict funding rates to one instrument
    pub funding_symbol: Option<String>,
}

impl AggregatorSettings {
    pub fn from_config(config: &AggregationConfig) -> Self {
        Self {
            timeout: config.timeout(),
            normalizer: NormalizerSettings {
                large_order_threshold: config.large_order_threshold,
            },
            funding_symbol: config.funding_symbol.clone(),
        }
    }
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(8),
            normalizer: NormalizerSettings::default(),
            funding_symbol: None,
        }
    }
}

/// Runs adapters and merges their normalized output
pub struct Aggregator {
    adapters: Vec<Arc<dyn ExchangeAdapter>>,
    settings: AggregatorSettings,
}

impl Aggregator {
    pub fn new(adapters: Vec<Arc<dyn ExchangeAdapter>>, settings: AggregatorSettings) -> Self {
        Self { adapters, settings }
    }

    fn symbol_filter(&self, kind: AggregationKind) -> Option<String> {
        match kind {
            AggregationKind::FundingRate => self.settings.funding_symbol.clone(),
            _ => None,
        }
    }

    /// Run one aggregation cycle for `kind`.
    ///
    /// Never fails: adapter errors land in `failures`, and when nothing
    /// succeeds the result is empty with a zeroed summary
    /// (`is_total_failure()` is then true).
    pub async fn aggregate(&self, kind: AggregationKind) -> AggregateResult {
        let started = Instant::now();
        let filter = self.symbol_filter(kind);
        let timeout = self.settings.timeout;

        let participants: Vec<&Arc<dyn ExchangeAdapter>> = self
            .adapters
            .iter()
            .filter(|adapter| adapter.supports(kind))
            .collect();

        let outcomes = join_all(participants.iter().map(|adapter| {
            let filter = filter.clone();
            async move {
                let exchange = adapter.exchange();
                let fetched = match tokio::time::timeout(timeout, adapter.fetch(kind, filter)).await
                {
                    Ok(fetched) => fetched,
                    Err(_) => Err(AdapterFailure::Timeout(timeout)),
                };
                let observed_at = Utc::now();
                let normalized = fetched.and_then(|raw| {
                    normalize(exchange, raw, kind, &self.settings.normalizer, observed_at)
                });
                (exchange, normalized)
            }
        }))
        .await;

        let mut result = AggregateResult::empty(kind);
        let mut diagnostics = BTreeMap::new();

        for (exchange, outcome) in outcomes {
            match outcome {
                Ok(normalized) => {
                    tracing::debug!(
                        exchange = %exchange,
                        kind = %kind,
                        quotes = normalized.quotes.len(),
                        skipped = normalized.stats.rows_skipped,
                        large_orders = normalized.stats.large_orders,
                        "Adapter normalized"
                    );
                    result.quotes.extend(normalized.quotes);
                    result.sources.push(exchange);
                    diagnostics.insert(exchange, normalized.stats);
                }
                Err(failure) => {
                    tracing::warn!(
                        exchange = %exchange,
                        kind = %kind,
                        reason = failure.reason(),
                        error = %failure,
                        "Adapter failed"
                    );
                    result.failures.insert(exchange, failure);
                }
            }
        }

        result.diagnostics = diagnostics;
        result.summary = Summary::compute(kind, &result.quotes);
        result.generated_at = Utc::now();

        if result.is_total_failure() {
            tracing::error!(
                kind = %kind,
                attempted = participants.len(),
                failures = ?result.failure_reasons(),
                "All sources unavailable"
            );
        } else {
            tracing::info!(
                kind = %kind,
                sources = ?result.sources,
                failed = result.failures.len(),
                quotes = result.quotes.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Aggregation cycle complete"
            );
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{
        MockExchangeAdapter, RawFundingRow, RawPayload, RawTicker, RawTrade, TradeSide,
    };
    use crate::types::Exchange;
    use async_trait::async_trait;
    use serde_json::json;

    fn funding_payload(symbol: &str, rate: &str) -> RawPayload {
        RawPayload::FundingRates(vec![RawFundingRow {
            symbol: Some(symbol.to_string()),
            rate: Some(json!(rate)),
            interval_hours: Some(8),
            ..Default::default()
        }])
    }

    fn mock_ok(exchange: Exchange, payload: RawPayload) -> Arc<dyn ExchangeAdapter> {
        let mut mock = MockExchangeAdapter::new();
        mock.expect_exchange().return_const(exchange);
        mock.expect_supports().return_const(true);
        mock.expect_fetch()
            .times(1)
            .returning(move |_, _| Ok(payload.clone()));
        Arc::new(mock)
    }

    fn mock_err(exchange: Exchange, failure: AdapterFailure) -> Arc<dyn ExchangeAdapter> {
        let mut mock = MockExchangeAdapter::new();
        mock.expect_exchange().return_const(exchange);
        mock.expect_supports().return_const(true);
        mock.expect_fetch()
            .times(1)
            .returning(move |_, _| Err(failure.clone()));
        Arc::new(mock)
    }

    struct SlowAdapter;

    #[async_trait]
    impl ExchangeAdapter for SlowAdapter {
        fn exchange(&self) -> Exchange {
            Exchange::Okx
        }

        fn supports(&self, _kind: AggregationKind) -> bool {
            true
        }

        async fn fetch(
            &self,
            _kind: AggregationKind,
            _symbol_filter: Option<String>,
        ) -> Result<RawPayload, AdapterFailure> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(RawPayload::FundingRates(vec![]))
        }
    }

    #[tokio::test]
    async fn partial_failure_keeps_successful_quotes() {
        let aggregator = Aggregator::new(
            vec![
                mock_ok(Exchange::Binance, funding_payload("BTCUSDT", "0.0001")),
                mock_err(Exchange::Bybit, AdapterFailure::Http(503)),
                mock_ok(Exchange::Bitget, funding_payload("ETHUSDT", "-0.0002")),
            ],
            AggregatorSettings::default(),
        );

        let result = aggregator.aggregate(AggregationKind::FundingRate).await;

        assert!(!result.is_total_failure());
        assert_eq!(result.quotes.len(), 2);
        assert_eq!(result.sources, vec![Exchange::Binance, Exchange::Bitget]);
        assert_eq!(
            result.failure_reasons().get("Bybit").map(String::as_str),
            Some("http_5xx")
        );
        let Summary::FundingRate { count, .. } = result.summary else {
            panic!("expected funding summary");
        };
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn all_failures_yield_zeroed_total_failure() {
        let aggregator = Aggregator::new(
            vec![
                mock_err(Exchange::Binance, AdapterFailure::Network("refused".into())),
                mock_err(Exchange::Bybit, AdapterFailure::InvalidSchema("missing".into())),
            ],
            AggregatorSettings::default(),
        );

        let result = aggregator.aggregate(AggregationKind::FundFlow).await;

        assert!(result.is_total_failure());
        assert!(result.quotes.is_empty());
        assert_eq!(result.failures.len(), 2);
        assert_eq!(result.summary, Summary::zeroed(AggregationKind::FundFlow));
    }

    #[tokio::test]
    async fn unsupported_adapters_are_not_invoked() {
        let mut mock = MockExchangeAdapter::new();
        mock.expect_exchange().return_const(Exchange::Binance);
        mock.expect_supports().return_const(false);
        mock.expect_fetch().never();

        let aggregator = Aggregator::new(vec![Arc::new(mock)], AggregatorSettings::default());
        let result = aggregator.aggregate(AggregationKind::OpenInterest).await;

        assert!(result.failures.is_empty());
        assert!(result.is_total_failure());
    }

    #[tokio::test]
    async fn slow_adapter_times_out_without_blocking_others() {
        let settings = AggregatorSettings {
            timeout: Duration::from_millis(50),
            ..Default::default()
        };
        let aggregator = Aggregator::new(
            vec![
                Arc::new(SlowAdapter),
                mock_ok(Exchange::Binance, funding_payload("BTCUSDT", "0.0001")),
            ],
            settings,
        );

        let started = Instant::now();
        let result = aggregator.aggregate(AggregationKind::FundingRate).await;

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(result.quotes.len(), 1);
        assert_eq!(
            result.failures.get(&Exchange::Okx),
            Some(&AdapterFailure::Timeout(Duration::from_millis(50)))
        );
    }

    #[tokio::test]
    async fn fund_flow_cycle_records_diagnostics() {
        let payload = RawPayload::Trades {
            trades: vec![
                RawTrade {
                    price: Some(json!("50000")),
                    size: Some(json!("3")),
                    side: Some(TradeSide::BuyerIsTaker(true)),
                },
                RawTrade {
                    price: Some(json!("oops")),
                    size: Some(json!("3")),
                    side: Some(TradeSide::BuyerIsTaker(true)),
                },
            ],
            ticker: RawTicker {
                symbol: Some("BTCUSDT".to_string()),
                quote_volume: Some(json!("1000000")),
                ..Default::default()
            },
        };
        let aggregator = Aggregator::new(
            vec![mock_ok(Exchange::Binance, payload)],
            AggregatorSettings::default(),
        );

        let result = aggregator.aggregate(AggregationKind::FundFlow).await;

        let stats = &result.diagnostics[&Exchange::Binance];
        assert_eq!(stats.large_orders, 1);
        assert_eq!(stats.rows_skipped, 1);
        assert_eq!(
            result.summary,
            Summary::FundFlow {
                total_inflow: 150_000.0,
                total_outflow: 0.0,
                total_net_flow: 150_000.0
            }
        );
    }

    #[tokio::test]
    async fn funding_symbol_is_passed_as_filter() {
        let mut mock = MockExchangeAdapter::new();
        mock.expect_exchange().return_const(Exchange::Bybit);
        mock.expect_supports().return_const(true);
        mock.expect_fetch()
            .withf(|kind, filter| {
                *kind == AggregationKind::FundingRate && filter.as_deref() == Some("ETHUSDT")
            })
            .times(1)
            .returning(|_, _| Ok(RawPayload::FundingRates(vec![])));

        let settings = AggregatorSettings {
            funding_symbol: Some("ETHUSDT".to_string()),
            ..Default::default()
        };
        let aggregator = Aggregator::new(vec![Arc::new(mock)], settings);
        let result = aggregator.aggregate(AggregationKind::FundingRate).await;

        assert_eq!(result.sources, vec![Exchange::Bybit]);
        assert!(result.quotes.is_empty());
    }
}
