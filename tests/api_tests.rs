//! End-to-end tests: real adapters against a mock exchange server,
//! driven through the HTTP router

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use cexpulse::aggregation::{AggregateCache, Aggregator, AggregatorSettings};
    use cexpulse::config::AppConfig;
    use cexpulse::dashboard::{create_router, AppState};
    use cexpulse::sources::build_adapters;
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    // ============================================================================
    // Helpers
    // ============================================================================

    /// Every exchange pointed at the same mock server
    fn config_for(server: &MockServer) -> AppConfig {
        let mut cfg = AppConfig::defaults().unwrap();
        cfg.exchanges.binance.spot_url = server.uri();
        cfg.exchanges.binance.futures_url = server.uri();
        cfg.exchanges.bybit.base_url = server.uri();
        cfg.exchanges.bitget.base_url = server.uri();
        cfg.exchanges.okx.base_url = server.uri();
        cfg
    }

    fn state_for(cfg: &AppConfig) -> AppState {
        let adapters = build_adapters(&cfg.exchanges, &cfg.aggregation).unwrap();
        AppState::new(
            Aggregator::new(adapters, AggregatorSettings::from_config(&cfg.aggregation)),
            AggregateCache::new(&cfg.cache),
        )
    }

    async fn get(state: AppState, uri: &str) -> (StatusCode, Value) {
        let response = create_router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn mount_funding_sources(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/fapi/v1/premiumIndex"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"symbol": "BTCUSDT", "lastFundingRate": "0.00010000"},
                {"symbol": "TRBUSDT", "lastFundingRate": "-0.00250000"}
            ])))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/fapi/v1/fundingInfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"symbol": "TRBUSDT", "fundingIntervalHours": 4}
            ])))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v5/market/tickers"))
            .and(query_param("category", "linear"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "retCode": 0,
                "retMsg": "OK",
                "result": {"category": "linear", "list": [
                    {"symbol": "ETHUSDT", "fundingRate": "0.0003", "fundingIntervalHour": "8",
                     "turnover24h": "1500000", "openInterestValue": "900000"}
                ]}
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v2/mix/market/tickers"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": "00000",
                "msg": "success",
                "data": [{"symbol": "BTCUSDT", "lastPr": "60000", "holdingAmount": "10",
                          "usdtVolume": "2500000", "change24h": "0.01", "fundingRate": "0.0001"}]
            })))
            .mount(server)
            .await;
    }

    // ============================================================================
    // Funding rates
    // ============================================================================

    #[tokio::test]
    async fn test_funding_rates_merge_all_supporting_exchanges() {
        let server = MockServer::start().await;
        mount_funding_sources(&server).await;

        let (status, body) = get(state_for(&config_for(&server)), "/api/funding-rates").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["data"].as_array().unwrap().len(), 4);
        assert_eq!(body["summary"]["count"], json!(4));
        assert_eq!(body["failures"], json!({}));

        let trb = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .find(|row| row["symbol"] == "TRB")
            .unwrap();
        assert_eq!(trb["exchange"], json!("Binance"));
        assert_eq!(trb["settlementInterval"], json!(4));
        assert_eq!(trb["isSpecialInterval"], json!(true));
    }

    #[tokio::test]
    async fn test_funding_rates_symbol_filter() {
        let server = MockServer::start().await;
        mount_funding_sources(&server).await;

        let (status, body) = get(
            state_for(&config_for(&server)),
            "/api/funding-rates?symbol=btcusdt",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let rows = body["data"].as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row["symbol"] == "BTC"));
        assert_eq!(body["summary"]["count"], json!(2));
        assert_eq!(body["summary"]["meanRate"], json!(0.0001));
    }

    // ============================================================================
    // Failures and caching
    // ============================================================================

    #[tokio::test]
    async fn test_missing_endpoints_are_reported_as_http_4xx() {
        let server = MockServer::start().await;
        mount_funding_sources(&server).await;

        // Only Bybit and Bitget tickers are mounted; Binance and OKX get 404
        let (status, body) = get(state_for(&config_for(&server)), "/api/open-interest").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["failures"], json!({"OKX": "http_4xx"}));
        assert_eq!(body["data"].as_array().unwrap().len(), 2);
        assert!(body["timestamp"].as_i64().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_all_sources_down_is_500() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let (status, body) = get(state_for(&config_for(&server)), "/api/volume").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"success": false, "error": "all sources unavailable"}));
    }

    #[tokio::test]
    async fn test_error_body_from_only_live_source_is_not_a_success() {
        let server = MockServer::start().await;
        // Binance answers 200 with a maintenance notice, everything else is down
        Mock::given(method("GET"))
            .and(path("/fapi/v1/premiumIndex"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"msg": "system maintenance"})),
            )
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/fapi/v1/fundingInfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let state = state_for(&config_for(&server));
        let (status, body) = get(state.clone(), "/api/funding-rates").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], json!(false));

        let (_, health) = get(state, "/api/health").await;
        assert_eq!(health["data"]["cachedKinds"], json!([]));
    }

    #[tokio::test]
    async fn test_second_request_within_ttl_is_served_from_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v5/market/tickers"))
            .and(query_param("category", "linear"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "retCode": 0,
                "result": {"list": [{"symbol": "BTCUSDT", "turnover24h": "1000000"}]}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut cfg = config_for(&server);
        cfg.exchanges.binance.enabled = false;
        cfg.exchanges.bitget.enabled = false;
        cfg.exchanges.okx.enabled = false;
        let state = state_for(&cfg);

        let (_, first) = get(state.clone(), "/api/volume").await;
        let (_, second) = get(state.clone(), "/api/volume").await;

        assert_eq!(first["timestamp"], second["timestamp"]);
        assert_eq!(second["summary"]["totalVolume"], json!(1_000_000.0));

        let (_, health) = get(state, "/api/health").await;
        assert_eq!(health["data"]["cachedKinds"], json!(["volume"]));
    }
}
