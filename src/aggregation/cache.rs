//! Per-kind TTL cache for aggregate results
//!
//! Each kind owns one slot. Writers swap in a whole `Arc<AggregateResult>`
//! so readers never see a half-updated aggregate, and a per-slot refresh
//! mutex keeps at most one aggregation per kind in flight.

use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

use super::AggregateResult;
use crate::config::CacheConfig;
use crate::types::AggregationKind;

#[derive(Debug, Default)]
struct Slot {
    entry: RwLock<Option<Arc<AggregateResult>>>,
    refresh: Mutex<()>,
}

/// Process-wide aggregate cache; created empty and injected into handlers
#[derive(Debug)]
pub struct AggregateCache {
    slots: [Slot; 4],
    ttls: [Duration; 4],
}

fn slot_index(kind: AggregationKind) -> usize {
    match kind {
        AggregationKind::FundingRate => 0,
        AggregationKind::FundFlow => 1,
        AggregationKind::Volume => 2,
        AggregationKind::OpenInterest => 3,
    }
}

impl AggregateCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            slots: Default::default(),
            ttls: AggregationKind::ALL.map(|kind| config.ttl(kind)),
        }
    }

    /// Same TTL for every kind
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            slots: Default::default(),
            ttls: [ttl; 4],
        }
    }

    pub fn ttl(&self, kind: AggregationKind) -> Duration {
        self.ttls[slot_index(kind)]
    }

    fn slot(&self, kind: AggregationKind) -> &Slot {
        &self.slots[slot_index(kind)]
    }

    /// Last stored result regardless of age
    pub async fn get(&self, kind: AggregationKind) -> Option<Arc<AggregateResult>> {
        self.slot(kind).entry.read().await.clone()
    }

    /// Replace the slot for the result's kind
    pub async fn set(&self, result: AggregateResult) -> Arc<AggregateResult> {
        let result = Arc::new(result);
        *self.slot(result.kind).entry.write().await = Some(result.clone());
        result
    }

    /// Whether the stored entry is younger than `ttl`
    pub async fn is_valid(&self, kind: AggregationKind, ttl: Duration) -> bool {
        self.fresh(kind, ttl).await.is_some()
    }

    async fn fresh(&self, kind: AggregationKind, ttl: Duration) -> Option<Arc<AggregateResult>> {
        let entry = self.get(kind).await?;
        let age = Utc::now().signed_duration_since(entry.generated_at);
        let valid = match chrono::Duration::from_std(ttl) {
            Ok(ttl) => age < ttl,
            Err(_) => true,
        };
        valid.then_some(entry)
    }

    /// Kinds holding an entry that is still within its TTL
    pub async fn cached_kinds(&self) -> Vec<AggregationKind> {
        let mut kinds = Vec::new();
        for kind in AggregationKind::ALL {
            if self.is_valid(kind, self.ttl(kind)).await {
                kinds.push(kind);
            }
        }
        kinds
    }

    /// Serve a valid entry, or run `refresh` and store its result.
    ///
    /// Concurrent callers for the same kind queue on the slot's refresh
    /// lock and re-check the entry once they hold it, so they share the
    /// first caller's fetch. Total failures are returned but not stored.
    pub async fn get_or_refresh<F, Fut>(&self, kind: AggregationKind, refresh: F) -> Arc<AggregateResult>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AggregateResult>,
    {
        let ttl = self.ttl(kind);
        if let Some(hit) = self.fresh(kind, ttl).await {
            tracing::debug!(kind = %kind, "Cache hit");
            return hit;
        }

        let _guard = self.slot(kind).refresh.lock().await;
        if let Some(hit) = self.fresh(kind, ttl).await {
            tracing::debug!(kind = %kind, "Cache filled while waiting");
            return hit;
        }

        tracing::debug!(kind = %kind, "Cache miss, refreshing");
        let result = refresh().await;
        if result.is_total_failure() {
            return Arc::new(result);
        }
        self.set(result).await
    }
}
