//! Shared helpers for the integration tests.
#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::Value;
use service_core::config::Config;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use yard2garden_service::config::GardenConfig;
use yard2garden_service::services::metrics::init_metrics;
use yard2garden_service::services::providers::mock::{MockProvider, MOCK_PNG};
use yard2garden_service::services::GenerationClient;
use yard2garden_service::startup::{build_router, AppState};

pub fn test_config(pairs: &[(&str, &str)]) -> GardenConfig {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    GardenConfig::from_lookup(
        Config {
            port: 0,
            environment: "test".to_string(),
        },
        |key| vars.get(key).cloned(),
    )
    .expect("test config")
}

/// A small valid PNG, base64-encoded.
pub fn png_base64() -> String {
    STANDARD.encode(MOCK_PNG)
}

pub fn router_with(provider: MockProvider, config: GardenConfig) -> (Router, Arc<MockProvider>) {
    init_metrics();
    let provider = Arc::new(provider);
    let generator = GenerationClient::new(
        provider.clone(),
        provider.clone(),
        config.generation.timeout,
    );

    let state = AppState {
        config: Arc::new(config),
        generator: Some(Arc::new(generator)),
    };
    (build_router(state), provider)
}

pub fn mock_router(provider: MockProvider) -> (Router, Arc<MockProvider>) {
    router_with(provider, test_config(&[("UPSTREAM_TIMEOUT_SECS", "5")]))
}

pub fn json_request(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

pub async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.expect("router response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

pub const SHORT_TIMEOUT: Duration = Duration::from_millis(50);
