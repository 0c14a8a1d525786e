//! The structured garden plan returned by the planner model.

use super::request::YardInput;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlanParseError {
    #[error("planner returned no text")]
    Empty,

    #[error("planner output is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("planner output is not a JSON object")]
    NotAnObject,

    #[error("planner output contains no steps")]
    NoSteps,
}

/// Parses raw model text as JSON, unwrapping a ```json fence if present.
pub fn extract_json(text: &str) -> Result<Value, PlanParseError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(PlanParseError::Empty);
    }

    let body = if trimmed.starts_with("```") {
        let mut lines: Vec<&str> = trimmed.lines().skip(1).collect();
        if lines
            .last()
            .is_some_and(|last| last.trim_start().starts_with("```"))
        {
            lines.pop();
        }
        lines.join("\n")
    } else {
        trimmed.to_string()
    };

    Ok(serde_json::from_str(body.trim())?)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StepByStepPlan {
    week_1_setup: Vec<String>,
    week_2_build: Vec<String>,
    week_3_plant: Vec<String>,
    ongoing_weekly: Vec<String>,
}

impl StepByStepPlan {
    fn into_steps(self) -> Vec<String> {
        [
            self.week_1_setup,
            self.week_2_build,
            self.week_3_plant,
            self.ongoing_weekly,
        ]
        .into_iter()
        .flatten()
        .map(|step| step.trim().to_string())
        .filter(|step| !step.is_empty())
        .collect()
    }
}

/// A parsed plan: the full document plus its ordered, flattened steps.
#[derive(Debug, Clone)]
pub struct GardenPlan {
    pub document: Value,
    pub steps: Vec<String>,
}

impl GardenPlan {
    pub fn from_model_output(text: &str, input: &YardInput) -> Result<Self, PlanParseError> {
        let mut document = extract_json(text)?;
        let root = document.as_object_mut().ok_or(PlanParseError::NotAnObject)?;

        pin_assumptions(root, input);

        // A malformed section is treated like a missing one.
        let steps = root
            .get("step_by_step_plan")
            .cloned()
            .and_then(|section| serde_json::from_value::<StepByStepPlan>(section).ok())
            .unwrap_or_default()
            .into_steps();

        if steps.is_empty() {
            return Err(PlanParseError::NoSteps);
        }

        Ok(Self { document, steps })
    }

    /// Numbered markdown list, one step per line.
    pub fn to_markdown(&self) -> String {
        self.steps
            .iter()
            .enumerate()
            .map(|(i, step)| format!("{}. {}", i + 1, step))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// The model may restate the inputs loosely; the caller's values win.
fn pin_assumptions(root: &mut Map<String, Value>, input: &YardInput) {
    let targets = input.budget.budget_targets();

    let assumptions = root
        .entry("assumptions")
        .or_insert_with(|| Value::Object(Map::new()));
    if !assumptions.is_object() {
        *assumptions = Value::Object(Map::new());
    }

    if let Some(assumptions) = assumptions.as_object_mut() {
        assumptions.insert(
            "location".to_string(),
            input
                .location
                .map(|l| {
                    json!({
                        "latitude": l.latitude,
                        "longitude": l.longitude,
                        "accuracy_m": l.accuracy_m,
                    })
                })
                .unwrap_or(Value::Null),
        );
        assumptions.insert("zip_code".to_string(), json!(input.zip_code));
        assumptions.insert("budget_tier".to_string(), json!(input.budget.as_str()));
        assumptions.insert("budget_target_usd".to_string(), json!(targets.target_usd));
        assumptions.insert("budget_max_usd".to_string(), json!(targets.max_usd));
        assumptions.insert("upkeep_level".to_string(), json!(input.upkeep.as_str()));
    }
}
