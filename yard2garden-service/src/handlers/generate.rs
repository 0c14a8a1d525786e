use super::generator;
use crate::models::{GenerationRequest, GenerationResponse};
use crate::startup::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;

/// `POST /v1/yard2garden`: base64 photo plus yard parameters in, after image and plan out.
#[tracing::instrument(skip_all)]
pub async fn generate_garden(
    State(state): State<AppState>,
    body: Result<Json<GenerationRequest>, JsonRejection>,
) -> Result<Json<GenerationResponse>, AppError> {
    let Json(request) = body.map_err(reject_body)?;

    let input = request.into_input(state.config.generation.max_image_bytes)?;
    let generator = generator(&state)?;

    tracing::info!(
        image_bytes = input.image.bytes.len(),
        mime = input.image.mime_type,
        has_location = input.location.is_some(),
        "Generating garden"
    );

    let result = generator.generate(&input).await?;
    Ok(Json(GenerationResponse::new(result, &input)))
}

pub(crate) fn reject_body(rejection: JsonRejection) -> AppError {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return AppError::PayloadTooLarge("request body is too large".to_string());
    }
    AppError::BadRequest(anyhow::anyhow!(rejection.body_text()))
}
