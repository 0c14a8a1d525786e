//! Prompt templates for the planner and the image editor.

use crate::models::YardInput;
use serde_json::json;

/// JSON shape the planner must return. `step_by_step_plan` is what the
/// response's numbered plan is built from.
const PLAN_SCHEMA: &str = r#"{
  "summary": string,
  "assumptions": {
    "location": { "latitude": number, "longitude": number, "accuracy_m": number|null } | null,
    "zip_code": string|null,
    "climate_estimates": {
      "usda_zone_estimate": string|null,
      "koppen_estimate": string|null,
      "frost_risk_notes": string
    },
    "budget_tier": "low"|"medium"|"high",
    "budget_target_usd": number,
    "budget_max_usd": number,
    "upkeep_level": "low"|"medium"|"high"
  },
  "site_observations": {
    "sun_exposure": string,
    "space_notes": string,
    "soil_notes": string,
    "drainage_notes": string,
    "constraints": [string]
  },
  "layout_plan": {
    "zones": [
      {
        "zone_name": string,
        "purpose": string,
        "size_estimate": string,
        "plants_recommended": [string],
        "layout_notes": string
      }
    ],
    "pathing_and_access": string,
    "irrigation_recommendation": string
  },
  "planting_plan": {
    "recommended_species": {
      "annual_vegetables": [{"common_name": string, "scientific_name": string}],
      "perennial_vegetables": [{"common_name": string, "scientific_name": string}],
      "herbs": [{"common_name": string, "scientific_name": string}],
      "berries": [{"common_name": string, "scientific_name": string}],
      "fruit_trees": [{"common_name": string, "scientific_name": string}],
      "pollinator_support": [{"common_name": string, "scientific_name": string}]
    },
    "optional_species": {
      "annual_vegetables": [{"common_name": string, "scientific_name": string}],
      "perennial_vegetables": [{"common_name": string, "scientific_name": string}],
      "herbs": [{"common_name": string, "scientific_name": string}],
      "berries": [{"common_name": string, "scientific_name": string}],
      "fruit_trees": [{"common_name": string, "scientific_name": string}]
    },
    "avoid_in_this_climate": [string]
  },
  "step_by_step_plan": {
    "week_1_setup": [string],
    "week_2_build": [string],
    "week_3_plant": [string],
    "ongoing_weekly": [string],
    "seasonal": {
      "spring": [string],
      "summer": [string],
      "fall": [string],
      "winter": [string]
    }
  },
  "shopping_list": [
    {"item": string, "quantity": string, "estimated_cost_usd": number}
  ],
  "estimated_total_cost_usd": number,
  "maintenance_plan": {
    "weekly_minutes": number,
    "watering_guidance": string,
    "weeding_guidance": string,
    "mulching_guidance": string,
    "pest_management_guidance": string
  }
}"#;

/// Prompt for the structured, climate-aware plan.
pub fn plan_prompt(input: &YardInput) -> String {
    let targets = input.budget.budget_targets();
    let user_inputs = json!({
        "location": input.location.map(|l| json!({
            "latitude": l.latitude,
            "longitude": l.longitude,
            "accuracy_m": l.accuracy_m,
        })),
        "zip_code": input.zip_code,
        "budget_tier": input.budget.as_str(),
        "budget_target_usd": targets.target_usd,
        "budget_max_usd": targets.max_usd,
        "upkeep_level": input.upkeep.as_str(),
    });
    let user_inputs =
        serde_json::to_string_pretty(&user_inputs).unwrap_or_else(|_| user_inputs.to_string());

    format!(
        r#"You are Yard2Garden AI Planner.

Goal:
- Study the photo of the user's yard.
- Produce a realistic food-garden plan, with build instructions, that fits the user's climate and constraints.
- Use the location when present, otherwise the ZIP/postal code. With neither, infer what you can from the photo and say so.

User inputs (copy into the assumptions object):
{user_inputs}

Rules:
1) Respond with JSON only. No markdown, no code fences, no commentary.
2) Be climate-aware: estimate a USDA hardiness zone and a Koppen climate from the location or postal code, and label both as estimates.
3) Prefer widely available, proven, region-appropriate food plants. When unsure, list fewer species and note the uncertainty. No tropical or citrus plants unless the climate clearly supports them.
4) estimated_total_cost_usd must not exceed budget_max_usd; aim for budget_target_usd.
5) Keep it buildable by ordinary people: clear steps, spacing notes, basic materials. For upkeep "low" favour fewer beds, perennials, heavy mulch, drip or soaker lines, and fewer fussy crops.
6) Organise plants by category with common and scientific names, split into recommended and optional, plus a short avoid_in_this_climate list where relevant.
7) Every list in step_by_step_plan holds short imperative steps, in the order they should be done.

Schema (keys and types must match):
{PLAN_SCHEMA}"#
    )
}

/// Prompt for the photorealistic "after" edit of the same photo.
pub fn after_image_prompt(input: &YardInput) -> String {
    let targets = input.budget.budget_targets();
    let climate_hint = match (&input.location, &input.zip_code) {
        (Some(l), _) => format!("Location: lat {}, lon {}.", l.latitude, l.longitude),
        (None, Some(zip)) => format!("ZIP/Postal: {}.", zip),
        (None, None) => "Location unknown; choose broadly hardy temperate plants.".to_string(),
    };

    format!(
        r#"Transform this exact yard photo into a realistic food-producing garden that could actually be built.
Keep the same camera angle, perspective, and property boundaries.

Constraints:
- Budget tier: {budget} (aim around ${target}; no luxury hardscaping)
- Upkeep level: {upkeep} (low = simpler, more perennials, heavy mulch; high = more intensive beds)
- {climate_hint}

Design notes:
- Add raised or in-ground beds, simple paths, mulch, and sensible spacing.
- Use region-appropriate plants; no tropical trees unless the climate supports them.
- Photorealistic, natural lighting, no text overlays, labels, or watermarks."#,
        budget = input.budget,
        target = targets.target_usd,
        upkeep = input.upkeep,
    )
}
