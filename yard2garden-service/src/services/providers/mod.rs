//! Upstream generation providers.
//!
//! The planner (vision + text) and the image editor are separate traits so a
//! backend can be swapped per concern; `OpenAiProvider` and `MockProvider`
//! each implement both.

pub mod mock;
pub mod openai;

use crate::models::SourceImage;
use async_trait::async_trait;
use thiserror::Error;

/// Error type for provider operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Upstream returned status {status}: {message}")]
    UpstreamError { status: u16, message: String },

    #[error("Malformed upstream response: {0}")]
    MalformedResponse(String),

    #[error("Upstream request timed out")]
    Timeout,
}

impl ProviderError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::NotConfigured(_) => "not_configured",
            ProviderError::NetworkError(_) => "network",
            ProviderError::UpstreamError { .. } => "upstream_status",
            ProviderError::MalformedResponse(_) => "malformed_response",
            ProviderError::Timeout => "timeout",
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else if err.is_decode() {
            ProviderError::MalformedResponse(err.to_string())
        } else {
            ProviderError::NetworkError(err.to_string())
        }
    }
}

/// Token accounting reported by the planner, when the upstream provides it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Raw planner output; parsing into a plan happens in the generation client.
#[derive(Debug, Clone)]
pub struct PlanOutput {
    pub text: String,
    pub usage: TokenUsage,
}

/// Produces the structured plan text from the photo and prompt.
#[async_trait]
pub trait PlanProvider: Send + Sync {
    /// Provider name used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Model used for planning.
    fn model(&self) -> &str;

    async fn generate_plan(
        &self,
        prompt: &str,
        image: &SourceImage,
    ) -> Result<PlanOutput, ProviderError>;
}

/// Renders the "after" photo from the uploaded one.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns decoded PNG bytes.
    async fn edit_image(&self, prompt: &str, image: &SourceImage)
        -> Result<Vec<u8>, ProviderError>;
}
