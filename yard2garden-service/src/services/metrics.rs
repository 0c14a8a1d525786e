//! Prometheus metrics for yard2garden-service.
//!
//! HTTP traffic plus upstream generation metrics, exposed on `/metrics`.

use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::{Once, OnceLock};
use std::time::Instant;

pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

// HTTP metrics
pub static HTTP_REQUESTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static HTTP_REQUEST_DURATION_SECONDS: OnceLock<HistogramVec> = OnceLock::new();

// Generation metrics
pub static GENERATIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static GENERATION_DURATION_SECONDS: OnceLock<HistogramVec> = OnceLock::new();
pub static UPSTREAM_LATENCY_SECONDS: OnceLock<HistogramVec> = OnceLock::new();
pub static UPSTREAM_ERRORS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static UPSTREAM_TOKENS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

static INIT: Once = Once::new();

/// Initialize all metrics. Safe to call more than once; only the first call registers.
pub fn init_metrics() {
    INIT.call_once(register_all);
}

fn register_all() {
    let registry = Registry::new();

    let http_requests = IntCounterVec::new(
        Opts::new("http_requests_total", "Total number of HTTP requests"),
        &["method", "path", "status"],
    )
    .expect("Failed to create http_requests_total metric");

    let http_duration = HistogramVec::new(
        HistogramOpts::new(
            "http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![0.005, 0.025, 0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0]),
        &["method", "path"],
    )
    .expect("Failed to create http_request_duration_seconds metric");

    // outcome: success, upstream_error, timeout
    let generations = IntCounterVec::new(
        Opts::new("yard2garden_generations_total", "Total generation attempts"),
        &["outcome"],
    )
    .expect("Failed to create yard2garden_generations_total metric");

    let generation_duration = HistogramVec::new(
        HistogramOpts::new(
            "yard2garden_generation_duration_seconds",
            "End-to-end generation duration in seconds",
        )
        .buckets(vec![1.0, 5.0, 10.0, 20.0, 30.0, 60.0, 90.0, 120.0]),
        &["outcome"],
    )
    .expect("Failed to create yard2garden_generation_duration_seconds metric");

    // operation: plan, image
    let upstream_latency = HistogramVec::new(
        HistogramOpts::new(
            "yard2garden_upstream_latency_seconds",
            "Upstream AI call latency in seconds",
        )
        .buckets(vec![0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0]),
        &["provider", "operation"],
    )
    .expect("Failed to create yard2garden_upstream_latency_seconds metric");

    let upstream_errors = IntCounterVec::new(
        Opts::new(
            "yard2garden_upstream_errors_total",
            "Total upstream AI errors",
        ),
        &["provider", "operation", "kind"],
    )
    .expect("Failed to create yard2garden_upstream_errors_total metric");

    let tokens = IntCounterVec::new(
        Opts::new("yard2garden_tokens_total", "Total planner tokens processed"),
        &["model", "type"], // type: input, output
    )
    .expect("Failed to create yard2garden_tokens_total metric");

    registry
        .register(Box::new(http_requests.clone()))
        .expect("Failed to register http_requests_total");
    registry
        .register(Box::new(http_duration.clone()))
        .expect("Failed to register http_request_duration_seconds");
    registry
        .register(Box::new(generations.clone()))
        .expect("Failed to register yard2garden_generations_total");
    registry
        .register(Box::new(generation_duration.clone()))
        .expect("Failed to register yard2garden_generation_duration_seconds");
    registry
        .register(Box::new(upstream_latency.clone()))
        .expect("Failed to register yard2garden_upstream_latency_seconds");
    registry
        .register(Box::new(upstream_errors.clone()))
        .expect("Failed to register yard2garden_upstream_errors_total");
    registry
        .register(Box::new(tokens.clone()))
        .expect("Failed to register yard2garden_tokens_total");

    let _ = REGISTRY.set(registry);
    let _ = HTTP_REQUESTS_TOTAL.set(http_requests);
    let _ = HTTP_REQUEST_DURATION_SECONDS.set(http_duration);
    let _ = GENERATIONS_TOTAL.set(generations);
    let _ = GENERATION_DURATION_SECONDS.set(generation_duration);
    let _ = UPSTREAM_LATENCY_SECONDS.set(upstream_latency);
    let _ = UPSTREAM_ERRORS_TOTAL.set(upstream_errors);
    let _ = UPSTREAM_TOKENS_TOTAL.set(tokens);

    tracing::info!("Prometheus metrics initialized");
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let registry = match REGISTRY.get() {
        Some(r) => r,
        None => {
            tracing::error!("Metrics registry not initialized");
            return "# Metrics registry not initialized\n".to_string();
        }
    };

    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&registry.gather(), &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return format!("# Failed to encode metrics: {}\n", e);
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to convert metrics to UTF-8");
        format!("# Failed to convert metrics to UTF-8: {}\n", e)
    })
}

/// Records count and latency per route template, so ids never explode label cardinality.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let started = Instant::now();
    let response = next.run(request).await;

    record_http_request(
        &method,
        &path,
        response.status().as_u16(),
        started.elapsed().as_secs_f64(),
    );
    response
}

pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    if let Some(counter) = HTTP_REQUESTS_TOTAL.get() {
        counter
            .with_label_values(&[method, path, &status.to_string()])
            .inc();
    }
    if let Some(histogram) = HTTP_REQUEST_DURATION_SECONDS.get() {
        histogram
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }
}

/// Record a finished generation.
pub fn record_generation(outcome: &str, duration_secs: f64) {
    if let Some(counter) = GENERATIONS_TOTAL.get() {
        counter.with_label_values(&[outcome]).inc();
    }
    if let Some(histogram) = GENERATION_DURATION_SECONDS.get() {
        histogram
            .with_label_values(&[outcome])
            .observe(duration_secs);
    }
}

pub fn record_upstream_latency(provider: &str, operation: &str, duration_secs: f64) {
    if let Some(histogram) = UPSTREAM_LATENCY_SECONDS.get() {
        histogram
            .with_label_values(&[provider, operation])
            .observe(duration_secs);
    }
}

pub fn record_upstream_error(provider: &str, operation: &str, kind: &str) {
    if let Some(counter) = UPSTREAM_ERRORS_TOTAL.get() {
        counter
            .with_label_values(&[provider, operation, kind])
            .inc();
    }
}

/// Record planner token usage.
pub fn record_tokens(model: &str, input_tokens: u64, output_tokens: u64) {
    if let Some(counter) = UPSTREAM_TOKENS_TOTAL.get() {
        counter
            .with_label_values(&[model, "input"])
            .inc_by(input_tokens);
        counter
            .with_label_values(&[model, "output"])
            .inc_by(output_tokens);
    }
}
