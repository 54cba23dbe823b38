//! Dashboard HTTP API
//!
//! Read-only GET endpoints over the aggregate cache.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, MethodRouter},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::types::*;
use super::AppState;
use crate::aggregation::normalizer::strip_quote_suffix;
use crate::aggregation::AggregateResult;
use crate::types::AggregationKind;

/// Create the API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/funding-rates", get_only(get(get_funding_rates)))
        .route("/api/fund-flow", get_only(get(get_fund_flow)))
        .route("/api/volume", get_only(get(get_volume)))
        .route("/api/open-interest", get_only(get(get_open_interest)))
        .route("/api/health", get_only(get(get_health)))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        // CORS for frontend
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

fn get_only(route: MethodRouter<AppState>) -> MethodRouter<AppState> {
    route.fallback(method_not_allowed)
}

// ─────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("all sources unavailable")]
    AllSourcesUnavailable,
    #[error("method not allowed")]
    MethodNotAllowed,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::AllSourcesUnavailable => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
        };
        (status, Json(ApiResponse::<()>::error(self.to_string()))).into_response()
    }
}

async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

/// Cached aggregate for `kind`, refreshed once per TTL window
async fn load(state: &AppState, kind: AggregationKind) -> Result<Arc<AggregateResult>, ApiError> {
    let aggregator = state.aggregator.clone();
    let result = state
        .cache
        .get_or_refresh(kind, || async move { aggregator.aggregate(kind).await })
        .await;

    if result.is_total_failure() {
        return Err(ApiError::AllSourcesUnavailable);
    }
    Ok(result)
}

// ─────────────────────────────────────────────────────────────────
// API Handlers
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct FundingQuery {
    symbol: Option<String>,
}

/// GET /api/funding-rates?symbol=BTC
async fn get_funding_rates(
    Query(query): Query<FundingQuery>,
    State(state): State<AppState>,
) -> Result<Json<AggregateResponse<FundingRateRow>>, ApiError> {
    let result = load(&state, AggregationKind::FundingRate).await?;

    // Accept "BTC", "btc" or a full pair like "BTCUSDT"
    let symbol = query
        .symbol
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| strip_quote_suffix(s).unwrap_or_else(|| s.to_uppercase()));

    Ok(Json(funding_rate_response(&result, symbol.as_deref())))
}

/// GET /api/fund-flow
async fn get_fund_flow(
    State(state): State<AppState>,
) -> Result<Json<AggregateResponse<FundFlowRow>>, ApiError> {
    let result = load(&state, AggregationKind::FundFlow).await?;
    Ok(Json(fund_flow_response(&result)))
}

/// GET /api/volume
async fn get_volume(
    State(state): State<AppState>,
) -> Result<Json<AggregateResponse<VolumeRow>>, ApiError> {
    let result = load(&state, AggregationKind::Volume).await?;
    Ok(Json(volume_response(&result)))
}

/// GET /api/open-interest
async fn get_open_interest(
    State(state): State<AppState>,
) -> Result<Json<AggregateResponse<OpenInterestRow>>, ApiError> {
    let result = load(&state, AggregationKind::OpenInterest).await?;
    Ok(Json(open_interest_response(&result)))
}

/// GET /api/health - liveness plus which kinds are currently cached
async fn get_health(State(state): State<AppState>) -> impl IntoResponse {
    let cached_kinds = state
        .cache
        .cached_kinds()
        .await
        .into_iter()
        .map(|kind| kind.as_str().to_string())
        .collect();
    Json(ApiResponse::success(HealthResponse {
        status: "ok".to_string(),
        cached_kinds,
    }))
}
