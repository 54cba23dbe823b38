//! Aggregation module - multi-exchange fan-out, normalization and caching
//!
//! One cycle fetches every adapter serving a kind concurrently, reduces
//! each payload to `ExchangeQuote`s and derives a summary from whatever
//! succeeded. Results are kept per kind in `AggregateCache`.

mod aggregator;
mod cache;
pub mod normalizer;

pub use aggregator::{Aggregator, AggregatorSettings};
pub use cache::AggregateCache;
pub use normalizer::{normalize, NormalizeStats, Normalized, NormalizerSettings};

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::sources::AdapterFailure;
use crate::types::{AggregationKind, Exchange, ExchangeQuote};

/// Derived totals, computed only from successful quotes
#[derive(Debug, Clone, PartialEq)]
pub enum Summary {
    FundFlow {
        total_inflow: f64,
        total_outflow: f64,
        total_net_flow: f64,
    },
    FundingRate {
        count: usize,
        mean_rate: f64,
    },
    Volume {
        total_volume: f64,
    },
    OpenInterest {
        total_open_interest: f64,
    },
}

impl Summary {
    pub fn compute(kind: AggregationKind, quotes: &[ExchangeQuote]) -> Self {
        match kind {
            AggregationKind::FundFlow => {
                let (total_inflow, total_outflow) =
                    quotes.iter().fold((0.0, 0.0), |(inflow, outflow), q| {
                        (
                            inflow + q.metric_value.max(0.0),
                            outflow + (-q.metric_value).max(0.0),
                        )
                    });
                Summary::FundFlow {
                    total_inflow,
                    total_outflow,
                    total_net_flow: total_inflow - total_outflow,
                }
            }
            AggregationKind::FundingRate => {
                let count = quotes.len();
                let mean_rate = if count == 0 {
                    0.0
                } else {
                    quotes.iter().map(|q| q.metric_value).sum::<f64>() / count as f64
                };
                Summary::FundingRate { count, mean_rate }
            }
            AggregationKind::Volume => Summary::Volume {
                total_volume: quotes.iter().map(|q| q.metric_value).sum(),
            },
            AggregationKind::OpenInterest => Summary::OpenInterest {
                total_open_interest: quotes.iter().map(|q| q.metric_value).sum(),
            },
        }
    }

    /// Summary of an empty quote set
    pub fn zeroed(kind: AggregationKind) -> Self {
        Self::compute(kind, &[])
    }
}

/// Outcome of one aggregation cycle
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateResult {
    pub kind: AggregationKind,
    /// Concatenated per-exchange quotes; no ordering guarantee
    pub quotes: Vec<ExchangeQuote>,
    pub failures: BTreeMap<Exchange, AdapterFailure>,
    /// Exchanges whose adapters succeeded
    pub sources: Vec<Exchange>,
    pub diagnostics: BTreeMap<Exchange, NormalizeStats>,
    pub summary: Summary,
    pub generated_at: DateTime<Utc>,
}

impl AggregateResult {
    /// Result with no successful source
    pub fn empty(kind: AggregationKind) -> Self {
        Self {
            kind,
            quotes: Vec::new(),
            failures: BTreeMap::new(),
            sources: Vec::new(),
            diagnostics: BTreeMap::new(),
            summary: Summary::zeroed(kind),
            generated_at: Utc::now(),
        }
    }

    /// True when no adapter succeeded (including when none serves the kind)
    pub fn is_total_failure(&self) -> bool {
        self.sources.is_empty()
    }

    /// Exchange name -> reason code
    pub fn failure_reasons(&self) -> BTreeMap<String, String> {
        self.failures
            .iter()
            .map(|(exchange, failure)| (exchange.to_string(), failure.reason().to_string()))
            .collect()
    }
}
