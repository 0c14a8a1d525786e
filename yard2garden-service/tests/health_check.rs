//! Runs the real server on a random port and probes it over HTTP.

mod common;

use common::{png_base64, test_config};
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use yard2garden_service::startup::Application;

/// Spawn the application on a random port and return the port number.
async fn spawn_app(pairs: &[(&str, &str)]) -> u16 {
    let app = Application::build(test_config(pairs))
        .await
        .expect("Failed to build application");
    let port = app.port();

    tokio::spawn(async move {
        let _ = app.run_until_stopped().await;
    });

    port
}

#[tokio::test]
async fn liveness_returns_ok() {
    let port = spawn_app(&[("GENERATION_PROVIDER", "mock")]).await;

    let response = Client::new()
        .get(format!("http://127.0.0.1:{}/", port))
        .timeout(Duration::from_secs(5))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status().as_u16(), 200);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(
        response.headers()["x-content-type-options"],
        "nosniff"
    );

    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["status"], "yard2garden-backend is alive 🌱");
}

#[tokio::test]
async fn health_reports_service_and_version() {
    let port = spawn_app(&[("GENERATION_PROVIDER", "mock")]).await;

    let body: serde_json::Value = Client::new()
        .get(format!("http://127.0.0.1:{}/health", port))
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse JSON");

    assert_eq!(body["ok"], true);
    assert_eq!(body["service"], "yard2garden-service");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn missing_credential_outside_prod_keeps_liveness_up() {
    // openai provider with neither OPENAI_API_KEY nor OPENAI_API_KEY_SECRET
    let port = spawn_app(&[]).await;
    let client = Client::new();

    let live = client
        .get(format!("http://127.0.0.1:{}/", port))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(live.status().as_u16(), 200);

    let response = client
        .post(format!("http://127.0.0.1:{}/v1/yard2garden", port))
        .json(&json!({ "image": png_base64() }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status().as_u16(), 500);
    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["error"], "configuration_error");
}

#[tokio::test]
async fn missing_credential_in_prod_fails_startup() {
    let config = yard2garden_service::config::GardenConfig::from_lookup(
        service_core::config::Config {
            port: 0,
            environment: "prod".to_string(),
        },
        |_| None,
    )
    .expect("prod config has defaults for everything but the credential");

    let result = Application::build(config).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn metrics_are_exposed() {
    let port = spawn_app(&[("GENERATION_PROVIDER", "mock")]).await;
    let client = Client::new();

    client
        .get(format!("http://127.0.0.1:{}/health", port))
        .send()
        .await
        .expect("Failed to send request");

    let response = client
        .get(format!("http://127.0.0.1:{}/metrics", port))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status().as_u16(), 200);
    let text = response.text().await.expect("Failed to read body");
    assert!(text.contains("http_requests_total"));
    assert!(text.contains("path=\"/health\""));
}
