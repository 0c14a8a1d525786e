//! Mock provider for tests and offline runs (`GENERATION_PROVIDER=mock`).

use super::{ImageProvider, PlanOutput, PlanProvider, ProviderError, TokenUsage};
use crate::models::SourceImage;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// A 1x1 transparent PNG.
pub const MOCK_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F, 0x15, 0xC4,
    0x89, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00, 0x01, 0x00, 0x00,
    0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE,
    0x42, 0x60, 0x82,
];

const MOCK_PLAN: &str = r#"{
  "summary": "Two raised beds along the sunny fence line with a mulched path.",
  "assumptions": {},
  "site_observations": {
    "sun_exposure": "Full sun along the back fence",
    "space_notes": "Roughly 6m x 4m of lawn",
    "soil_notes": "Compacted turf",
    "drainage_notes": "No standing water visible",
    "constraints": ["Shed in the north-east corner"]
  },
  "step_by_step_plan": {
    "week_1_setup": ["Clear debris and mark bed outlines", "Sheet-mulch the turf with cardboard"],
    "week_2_build": ["Build two 1.2m x 2.4m raised beds", "Fill beds with compost and topsoil"],
    "week_3_plant": ["Plant tomatoes, kale and bush beans", "Sow a herb border"],
    "ongoing_weekly": ["Water deeply twice a week", "Pull weeds while small"],
    "seasonal": { "spring": [], "summer": [], "fall": [], "winter": [] }
  },
  "estimated_total_cost_usd": 320
}"#;

/// How the mock answers.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    Succeed,
    Fail(ProviderError),
    /// Sleeps before succeeding; used to exercise deadlines.
    Delay(Duration),
}

pub struct MockProvider {
    behavior: MockBehavior,
    plan_text: String,
    image: Vec<u8>,
    plan_calls: AtomicUsize,
    image_calls: AtomicUsize,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new(MockBehavior::Succeed)
    }
}

impl MockProvider {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            plan_text: MOCK_PLAN.to_string(),
            image: MOCK_PNG.to_vec(),
            plan_calls: AtomicUsize::new(0),
            image_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_plan_text(mut self, text: impl Into<String>) -> Self {
        self.plan_text = text.into();
        self
    }

    pub fn plan_calls(&self) -> usize {
        self.plan_calls.load(Ordering::SeqCst)
    }

    pub fn image_calls(&self) -> usize {
        self.image_calls.load(Ordering::SeqCst)
    }

    async fn behave(&self) -> Result<(), ProviderError> {
        match &self.behavior {
            MockBehavior::Succeed => Ok(()),
            MockBehavior::Fail(err) => Err(err.clone()),
            MockBehavior::Delay(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl PlanProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-planner"
    }

    async fn generate_plan(
        &self,
        prompt: &str,
        _image: &SourceImage,
    ) -> Result<PlanOutput, ProviderError> {
        self.plan_calls.fetch_add(1, Ordering::SeqCst);
        self.behave().await?;

        Ok(PlanOutput {
            text: self.plan_text.clone(),
            usage: TokenUsage {
                input_tokens: prompt.len() as u64 / 4,
                output_tokens: self.plan_text.len() as u64 / 4,
            },
        })
    }
}

#[async_trait]
impl ImageProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn edit_image(
        &self,
        _prompt: &str,
        _image: &SourceImage,
    ) -> Result<Vec<u8>, ProviderError> {
        self.image_calls.fetch_add(1, Ordering::SeqCst);
        self.behave().await?;

        Ok(self.image.clone())
    }
}
