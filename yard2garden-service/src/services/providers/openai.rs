//! OpenAI provider implementation.
//!
//! Planning goes through the Responses API with the photo attached as a data
//! URL; the "after" photo comes from the Images Edit endpoint.

use super::{ImageProvider, PlanOutput, PlanProvider, ProviderError, TokenUsage};
use crate::models::SourceImage;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upstream error bodies are truncated to this many characters in logs.
const MAX_ERROR_BODY_CHARS: usize = 512;

/// OpenAI provider configuration.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: Secret<String>,
    pub base_url: String,
    pub plan_model: String,
    pub image_model: String,
    pub image_size: String,
    /// Per-call HTTP timeout.
    pub request_timeout: Duration,
}

pub struct OpenAiProvider {
    config: OpenAiConfig,
    client: Client,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiConfig) -> Result<Self, ProviderError> {
        if config.api_key.expose_secret().is_empty() {
            return Err(ProviderError::NotConfigured(
                "OpenAI API key is empty".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Maps a non-success response to `UpstreamError`, keeping the upstream's
    /// own message when it sends one.
    async fn check_status(response: Response) -> Result<Response, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorEnvelope>(&body)
            .map(|envelope| envelope.error.message)
            .unwrap_or_else(|_| body.chars().take(MAX_ERROR_BODY_CHARS).collect());

        tracing::warn!(
            status = status.as_u16(),
            upstream_message = %message,
            "OpenAI API returned an error"
        );

        Err(ProviderError::UpstreamError {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl PlanProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.config.plan_model
    }

    async fn generate_plan(
        &self,
        prompt: &str,
        image: &SourceImage,
    ) -> Result<PlanOutput, ProviderError> {
        let request = ResponsesRequest {
            model: &self.config.plan_model,
            input: vec![InputMessage {
                role: "user",
                content: vec![
                    InputContent::InputText {
                        text: prompt.to_string(),
                    },
                    InputContent::InputImage {
                        image_url: image.data_url(),
                    },
                ],
            }],
            text: TextOptions {
                format: TextFormat {
                    kind: "json_object",
                },
            },
        };

        tracing::debug!(
            model = %self.config.plan_model,
            prompt_len = prompt.len(),
            image_bytes = image.bytes.len(),
            "Sending plan request to OpenAI"
        );

        let response = self
            .client
            .post(self.api_url("responses"))
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&request)
            .send()
            .await?;

        let api_response: ResponsesResponse = Self::check_status(response).await?.json().await?;

        let text: String = api_response
            .output
            .iter()
            .filter(|item| item.kind == "message")
            .flat_map(|item| item.content.iter())
            .filter(|part| part.kind == "output_text")
            .filter_map(|part| part.text.as_deref())
            .collect();

        if text.trim().is_empty() {
            return Err(ProviderError::MalformedResponse(
                "response contained no output text".to_string(),
            ));
        }

        let usage = api_response.usage.unwrap_or_default();

        Ok(PlanOutput {
            text,
            usage: TokenUsage {
                input_tokens: usage.input_tokens,
                output_tokens: usage.output_tokens,
            },
        })
    }
}

#[async_trait]
impl ImageProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn edit_image(
        &self,
        prompt: &str,
        image: &SourceImage,
    ) -> Result<Vec<u8>, ProviderError> {
        let part = Part::bytes(image.bytes.clone())
            .file_name(format!("yard.{}", image.extension()))
            .mime_str(image.mime_type)
            .map_err(|e| ProviderError::NotConfigured(format!("image part: {}", e)))?;

        let form = Form::new()
            .text("model", self.config.image_model.clone())
            .text("prompt", prompt.to_string())
            .text("size", self.config.image_size.clone())
            .text("output_format", "png")
            .text("n", "1")
            .part("image", part);

        tracing::debug!(
            model = %self.config.image_model,
            size = %self.config.image_size,
            "Sending image edit request to OpenAI"
        );

        let response = self
            .client
            .post(self.api_url("images/edits"))
            .bearer_auth(self.config.api_key.expose_secret())
            .multipart(form)
            .send()
            .await?;

        let api_response: ImagesResponse = Self::check_status(response).await?.json().await?;

        let encoded = api_response
            .data
            .into_iter()
            .find_map(|image| image.b64_json)
            .ok_or_else(|| {
                ProviderError::MalformedResponse("image response contained no data".to_string())
            })?;

        let bytes = STANDARD.decode(encoded.trim()).map_err(|e| {
            ProviderError::MalformedResponse(format!("image is not valid base64: {}", e))
        })?;

        if bytes.is_empty() {
            return Err(ProviderError::MalformedResponse(
                "image decoded to zero bytes".to_string(),
            ));
        }

        Ok(bytes)
    }
}

// ============================================================================
// OpenAI API Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    input: Vec<InputMessage>,
    text: TextOptions,
}

#[derive(Debug, Serialize)]
struct InputMessage {
    role: &'static str,
    content: Vec<InputContent>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum InputContent {
    InputText { text: String },
    InputImage { image_url: String },
}

#[derive(Debug, Serialize)]
struct TextOptions {
    format: TextFormat,
}

#[derive(Debug, Serialize)]
struct TextFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ResponsesResponse {
    #[serde(default)]
    output: Vec<OutputItem>,
    #[serde(default)]
    usage: Option<ResponsesUsage>,
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Vec<OutputContent>,
}

#[derive(Debug, Deserialize)]
struct OutputContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ResponsesUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    #[serde(default)]
    b64_json: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}
