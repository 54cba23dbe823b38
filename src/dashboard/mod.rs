//! Dashboard Module
//!
//! HTTP API serving cached multi-exchange aggregates to the frontend.

mod api;
mod types;

pub use api::{create_router, ApiError};
pub use types::*;

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::aggregation::{AggregateCache, Aggregator};
use crate::config::ServerConfig;

/// Shared handler state; the cache is created empty at startup
#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<Aggregator>,
    pub cache: Arc<AggregateCache>,
}

impl AppState {
    pub fn new(aggregator: Aggregator, cache: AggregateCache) -> Self {
        Self {
            aggregator: Arc::new(aggregator),
            cache: Arc::new(cache),
        }
    }
}

/// Start the dashboard server; returns after Ctrl-C
pub async fn start_server(state: AppState, server: &ServerConfig) -> Result<()> {
    let app = create_router(state);
    let addr = format!("{}:{}", server.host, server.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    tracing::info!(addr = %addr, "Dashboard API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("dashboard server failed")?;

    tracing::info!("Dashboard API stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signal"),
    }
}
