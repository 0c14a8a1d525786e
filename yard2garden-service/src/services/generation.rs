//! The generation client: one plan call and one image call per request,
//! run concurrently under a single deadline.

use super::metrics;
use super::prompts;
use super::providers::{ImageProvider, PlanOutput, PlanProvider, ProviderError};
use crate::models::{GardenPlan, GenerationResult, PlanParseError, SourceImage, YardInput};
use service_core::error::AppError;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("unusable plan: {0}")]
    Plan(#[from] PlanParseError),

    #[error("generation exceeded {0:?}")]
    Timeout(Duration),
}

impl GenerationError {
    fn outcome(&self) -> &'static str {
        match self {
            GenerationError::Provider(ProviderError::Timeout) | GenerationError::Timeout(_) => {
                "timeout"
            }
            GenerationError::Provider(_) | GenerationError::Plan(_) => "upstream_error",
        }
    }
}

impl From<GenerationError> for AppError {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::Timeout(_) | GenerationError::Provider(ProviderError::Timeout) => {
                AppError::GatewayTimeout("upstream generation timed out".to_string())
            }
            GenerationError::Provider(ProviderError::NotConfigured(msg)) => {
                AppError::ConfigError(anyhow::anyhow!(msg))
            }
            GenerationError::Provider(ProviderError::NetworkError(_)) => {
                AppError::BadGateway("upstream could not be reached".to_string())
            }
            GenerationError::Provider(ProviderError::UpstreamError { status, .. }) => {
                AppError::BadGateway(format!("upstream returned status {}", status))
            }
            GenerationError::Provider(ProviderError::MalformedResponse(_)) => {
                AppError::BadGateway("upstream returned a malformed response".to_string())
            }
            GenerationError::Plan(_) => {
                AppError::BadGateway("upstream returned an unusable plan".to_string())
            }
        }
    }
}

pub struct GenerationClient {
    plan_provider: Arc<dyn PlanProvider>,
    image_provider: Arc<dyn ImageProvider>,
    timeout: Duration,
}

impl GenerationClient {
    pub fn new(
        plan_provider: Arc<dyn PlanProvider>,
        image_provider: Arc<dyn ImageProvider>,
        timeout: Duration,
    ) -> Self {
        Self {
            plan_provider,
            image_provider,
            timeout,
        }
    }

    /// No retries: a failure of either call fails the request and drops the other.
    #[tracing::instrument(
        skip_all,
        fields(
            budget = %input.budget,
            upkeep = %input.upkeep,
            has_location = input.location.is_some(),
            image_bytes = input.image.bytes.len(),
        )
    )]
    pub async fn generate(&self, input: &YardInput) -> Result<GenerationResult, GenerationError> {
        let started = Instant::now();
        let result = self.run(input).await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.outcome(),
        };
        metrics::record_generation(outcome, started.elapsed().as_secs_f64());

        match &result {
            Ok(generated) => tracing::info!(
                steps = generated.plan.steps.len(),
                after_image_bytes = generated.after_image.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Generation completed"
            ),
            Err(e) => tracing::warn!(error = %e, outcome, "Generation failed"),
        }

        result
    }

    async fn run(&self, input: &YardInput) -> Result<GenerationResult, GenerationError> {
        let plan_prompt = prompts::plan_prompt(input);
        let image_prompt = prompts::after_image_prompt(input);

        let calls = async {
            tokio::try_join!(
                self.plan(&plan_prompt, &input.image),
                self.after_image(&image_prompt, &input.image),
            )
        };

        let (plan_output, after_image) = tokio::time::timeout(self.timeout, calls)
            .await
            .map_err(|_| GenerationError::Timeout(self.timeout))??;

        let plan = GardenPlan::from_model_output(&plan_output.text, input).map_err(|e| {
            metrics::record_upstream_error(self.plan_provider.name(), "plan", "unusable_plan");
            e
        })?;

        Ok(GenerationResult { after_image, plan })
    }

    async fn plan(&self, prompt: &str, image: &SourceImage) -> Result<PlanOutput, ProviderError> {
        let provider = self.plan_provider.name();
        let started = Instant::now();
        let result = self.plan_provider.generate_plan(prompt, image).await;
        metrics::record_upstream_latency(provider, "plan", started.elapsed().as_secs_f64());

        match &result {
            Ok(output) => metrics::record_tokens(
                self.plan_provider.model(),
                output.usage.input_tokens,
                output.usage.output_tokens,
            ),
            Err(e) => metrics::record_upstream_error(provider, "plan", e.kind()),
        }

        result
    }

    async fn after_image(
        &self,
        prompt: &str,
        image: &SourceImage,
    ) -> Result<Vec<u8>, ProviderError> {
        let provider = self.image_provider.name();
        let started = Instant::now();
        let result = self.image_provider.edit_image(prompt, image).await;
        metrics::record_upstream_latency(provider, "image", started.elapsed().as_secs_f64());

        if let Err(e) = &result {
            metrics::record_upstream_error(provider, "image", e.kind());
        }

        result
    }
}
