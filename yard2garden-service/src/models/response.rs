//! Outbound response shape.

use super::plan::GardenPlan;
use super::request::{Location, Tier, YardInput};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// What the generation client hands back for one request.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    /// PNG bytes of the rendered "after" photo.
    pub after_image: Vec<u8>,
    pub plan: GardenPlan,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResponse {
    pub after_image: String,
    pub after_image_mime: &'static str,
    /// Markdown numbered list of the plan's steps.
    pub plan: String,
    pub steps: Vec<String>,
    pub garden_plan: serde_json::Value,
    pub inputs: InputsEcho,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InputsEcho {
    pub location: Option<Location>,
    pub zip_code: Option<String>,
    pub budget: Tier,
    pub upkeep: Tier,
}

impl GenerationResponse {
    pub fn new(result: GenerationResult, input: &YardInput) -> Self {
        let GenerationResult { after_image, plan } = result;

        Self {
            after_image: STANDARD.encode(after_image),
            after_image_mime: "image/png",
            plan: plan.to_markdown(),
            steps: plan.steps,
            garden_plan: plan.document,
            inputs: InputsEcho {
                location: input.location,
                zip_code: input.zip_code.clone(),
                budget: input.budget,
                upkeep: input.upkeep,
            },
            filename: None,
            generated_at: Utc::now(),
        }
    }

    pub fn with_filename(mut self, filename: Option<String>) -> Self {
        self.filename = filename;
        self
    }
}
