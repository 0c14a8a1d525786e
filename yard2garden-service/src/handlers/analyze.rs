use super::generator;
use crate::models::{GenerationResponse, Tier, YardInput, YardParams};
use crate::startup::AppState;
use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use std::str::FromStr;

/// `POST /analyze-yard`: the same pipeline fed from a multipart upload.
#[tracing::instrument(skip_all)]
pub async fn analyze_yard(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<GenerationResponse>, AppError> {
    let mut file: Option<(Option<String>, Vec<u8>)> = None;
    let mut params = YardParams::default();

    while let Some(field) = multipart.next_field().await.map_err(reject_multipart)? {
        let name = field.name().unwrap_or_default().to_string();

        if name == "file" {
            let filename = field.file_name().map(str::to_string);
            let bytes = field.bytes().await.map_err(reject_multipart)?;
            file = Some((filename, bytes.to_vec()));
            continue;
        }

        let value = field.text().await.map_err(reject_multipart)?;
        let value = value.trim();
        if value.is_empty() {
            continue;
        }

        match name.as_str() {
            "latitude" | "lat" => params.latitude = Some(number(&name, value)?),
            "longitude" | "lng" | "lon" => params.longitude = Some(number(&name, value)?),
            "accuracy_m" | "accuracyM" => params.accuracy_m = Some(number(&name, value)?),
            "zip_code" | "zipCode" => params.zip_code = Some(value.to_string()),
            "budget" => params.budget = tier(&name, value)?,
            "upkeep" => params.upkeep = tier(&name, value)?,
            other => tracing::debug!(field = %other, "Ignoring unknown form field"),
        }
    }

    let (filename, bytes) = file.ok_or_else(|| {
        AppError::InvalidInput("validation_failed", "file is required".to_string())
    })?;

    params.check()?;
    let input = YardInput::new(bytes, params, state.config.generation.max_image_bytes)?;
    let generator = generator(&state)?;

    tracing::info!(
        image_bytes = input.image.bytes.len(),
        mime = input.image.mime_type,
        filename = filename.as_deref().unwrap_or(""),
        "Analyzing uploaded yard"
    );

    let result = generator.generate(&input).await?;
    Ok(Json(
        GenerationResponse::new(result, &input).with_filename(filename),
    ))
}

fn reject_multipart(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return AppError::PayloadTooLarge("upload is too large".to_string());
    }
    AppError::BadRequest(anyhow::anyhow!(err.body_text()))
}

fn number(field: &str, value: &str) -> Result<f64, AppError> {
    value
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .ok_or_else(|| {
            AppError::InvalidInput("validation_failed", format!("{} must be a number", field))
        })
}

fn tier(field: &str, value: &str) -> Result<Tier, AppError> {
    Tier::from_str(value)
        .map_err(|e| AppError::InvalidInput("validation_failed", format!("{}: {}", field, e)))
}
