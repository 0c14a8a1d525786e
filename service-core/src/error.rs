use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    /// A rejected input with a machine-readable code, e.g. `invalid_image`.
    #[error("Invalid input ({0}): {1}")]
    InvalidInput(&'static str, String),

    #[error("Bad request: {0}")]
    BadRequest(anyhow::Error),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),

    #[error("Bad Gateway: {0}")]
    BadGateway(String),

    #[error("Gateway Timeout: {0}")]
    GatewayTimeout(String),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) | AppError::InvalidInput(..) | AppError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::InternalError(_) | AppError::ConfigError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            AppError::GatewayTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Stable reason code returned in the `error` field.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "validation_failed",
            AppError::InvalidInput(code, _) => *code,
            AppError::BadRequest(_) => "invalid_request",
            AppError::PayloadTooLarge(_) => "payload_too_large",
            AppError::InternalError(_) => "internal_error",
            AppError::BadGateway(_) => "upstream_error",
            AppError::GatewayTimeout(_) => "upstream_timeout",
            AppError::ConfigError(_) => "configuration_error",
        }
    }
}

/// Flattens validator output into one line, ordered by field name so the
/// message is stable across runs.
fn summarize_validation(errors: &validator::ValidationErrors) -> String {
    let mut fields: Vec<(String, String)> = errors
        .field_errors()
        .into_iter()
        .filter_map(|(field, errs)| {
            errs.first().map(|e| {
                let message = e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| e.code.to_string());
                (field.to_string(), message)
            })
        })
        .collect();
    fields.sort();

    fields
        .into_iter()
        .map(|(_, message)| message)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: &'static str,
            #[serde(skip_serializing_if = "Option::is_none")]
            details: Option<String>,
        }

        let status = self.status_code();
        let code = self.code();

        // Server-side causes are logged here and never echoed to the caller.
        let details = match &self {
            AppError::ValidationError(err) => Some(summarize_validation(err)),
            AppError::InvalidInput(_, msg) => Some(msg.clone()),
            AppError::BadRequest(err) => Some(err.to_string()),
            AppError::PayloadTooLarge(msg) => Some(msg.clone()),
            AppError::InternalError(err) => {
                tracing::error!(error = ?err, "Internal error");
                None
            }
            AppError::ConfigError(err) => {
                tracing::error!(error = %err, "Configuration error");
                Some("service is not configured for generation".to_string())
            }
            AppError::BadGateway(msg) => {
                tracing::warn!(reason = %msg, "Upstream failure");
                Some(msg.clone())
            }
            AppError::GatewayTimeout(msg) => {
                tracing::warn!(reason = %msg, "Upstream timeout");
                Some(msg.clone())
            }
        };

        (
            status,
            Json(ErrorResponse {
                error: code,
                details,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[derive(Validate)]
    struct Probe {
        #[validate(range(min = -90.0, max = 90.0, message = "latitude must be within [-90, 90]"))]
        latitude: f64,
    }

    async fn body_json(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn validation_errors_map_to_bad_request() {
        let errors = Probe { latitude: 91.0 }.validate().unwrap_err();
        let (status, body) = body_json(AppError::from(errors)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_failed");
        assert_eq!(body["details"], "latitude must be within [-90, 90]");
    }

    #[tokio::test]
    async fn internal_errors_hide_their_cause() {
        let (status, body) =
            body_json(AppError::InternalError(anyhow::anyhow!("key=sk-secret"))).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "internal_error");
        assert!(body.get("details").is_none());
    }

    #[tokio::test]
    async fn config_errors_do_not_leak_details() {
        let (status, body) =
            body_json(AppError::ConfigError(anyhow::anyhow!("OPENAI_API_KEY missing"))).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "configuration_error");
        assert!(!body.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn upstream_errors_use_gateway_statuses() {
        assert_eq!(
            AppError::BadGateway("x".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            AppError::GatewayTimeout("x".into()).status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            AppError::PayloadTooLarge("x".into()).status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
    }
}
