//! HTTP handlers for the yard2garden service.

pub mod analyze;
pub mod generate;
pub mod health;
pub mod metrics;

use crate::startup::AppState;
use crate::services::GenerationClient;
use service_core::error::AppError;
use std::sync::Arc;

/// The generation client, or a configuration error when startup ran without a credential.
fn generator(state: &AppState) -> Result<Arc<GenerationClient>, AppError> {
    state.generator.clone().ok_or_else(|| {
        AppError::ConfigError(anyhow::anyhow!(
            "generation requested but no upstream credential was resolved"
        ))
    })
}
