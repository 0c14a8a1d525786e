use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

/// Liveness probe for the hosting platform. Never touches upstream state.
pub async fn liveness() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({ "status": "yard2garden-backend is alive 🌱" })),
    )
}

pub async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "ok": true,
            "service": "yard2garden-service",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}
