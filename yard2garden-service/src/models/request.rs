//! Inbound request shapes and their validated form.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use std::fmt;
use std::str::FromStr;
use validator::{Validate, ValidationErrors};

/// Budget and upkeep sliders share the same three tiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Low,
    #[default]
    Medium,
    High,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Low => "low",
            Tier::Medium => "medium",
            Tier::High => "high",
        }
    }

    /// Spend targets handed to the planner for a budget tier.
    pub fn budget_targets(&self) -> BudgetTargets {
        match self {
            Tier::Low => BudgetTargets {
                target_usd: 150,
                max_usd: 250,
            },
            Tier::Medium => BudgetTargets {
                target_usd: 350,
                max_usd: 600,
            },
            Tier::High => BudgetTargets {
                target_usd: 800,
                max_usd: 1400,
            },
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Tier::Low),
            "medium" => Ok(Tier::Medium),
            "high" => Ok(Tier::High),
            other => Err(format!("'{}' is not one of low, medium, high", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetTargets {
    pub target_usd: u32,
    pub max_usd: u32,
}

/// JSON body of `POST /v1/yard2garden`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    /// Base64 image, optionally as a `data:<mime>;base64,` URL.
    #[serde(default)]
    pub image: String,
    #[serde(flatten)]
    pub params: YardParams,
}

/// Everything about the yard except the photo itself.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct YardParams {
    #[serde(default, alias = "lat")]
    #[validate(range(
        min = -90.0,
        max = 90.0,
        message = "latitude must be between -90 and 90"
    ))]
    pub latitude: Option<f64>,

    #[serde(default, alias = "lng", alias = "lon")]
    #[validate(range(
        min = -180.0,
        max = 180.0,
        message = "longitude must be between -180 and 180"
    ))]
    pub longitude: Option<f64>,

    #[serde(default, alias = "accuracy_m")]
    #[validate(range(min = 0.0, message = "accuracyM must not be negative"))]
    pub accuracy_m: Option<f64>,

    #[serde(default, alias = "zip_code")]
    pub zip_code: Option<String>,

    #[serde(default)]
    pub budget: Tier,

    #[serde(default)]
    pub upkeep: Tier,
}

/// Field order used to pick the first violation to report. Entries are the
/// Rust field names of `YardParams`, which is what validator keys errors by.
const FIELD_ORDER: [&str; 3] = ["latitude", "longitude", "accuracy_m"];

fn first_violation(errors: ValidationErrors) -> AppError {
    let message = {
        let by_field = errors.field_errors();
        FIELD_ORDER.iter().find_map(|field| {
            by_field
                .get(*field)
                .and_then(|errs| errs.first())
                .and_then(|e| e.message.as_ref())
                .map(|m| m.to_string())
        })
    };

    match message {
        Some(message) => AppError::InvalidInput("validation_failed", message),
        None => AppError::ValidationError(errors),
    }
}

impl YardParams {
    pub fn check(&self) -> Result<(), AppError> {
        if let Err(errors) = self.validate() {
            return Err(first_violation(errors));
        }

        if self.latitude.is_some() != self.longitude.is_some() {
            return Err(AppError::InvalidInput(
                "validation_failed",
                "latitude and longitude must be provided together".to_string(),
            ));
        }

        Ok(())
    }

    fn location(&self) -> Option<Location> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(Location {
                latitude,
                longitude,
                accuracy_m: self.accuracy_m,
            }),
            _ => None,
        }
    }

    fn normalized_zip(&self) -> Option<String> {
        self.zip_code
            .as_deref()
            .map(str::trim)
            .filter(|z| !z.is_empty())
            .map(str::to_string)
    }
}

impl GenerationRequest {
    /// Validates in reporting order: image present, fields in range, image
    /// decodes, decoded size within `max_image_bytes`.
    pub fn into_input(self, max_image_bytes: usize) -> Result<YardInput, AppError> {
        if self.image.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "validation_failed",
                "image is required".to_string(),
            ));
        }
        self.params.check()?;

        let bytes = decode_image(&self.image)?;
        YardInput::new(bytes, self.params, max_image_bytes)
    }
}

/// Decodes standard base64, tolerating a data-URL prefix and line wrapping.
pub fn decode_image(encoded: &str) -> Result<Vec<u8>, AppError> {
    let payload = match encoded.trim().split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => encoded,
    };
    let compact: String = payload
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();

    STANDARD.decode(compact.as_bytes()).map_err(|_| {
        AppError::InvalidInput("invalid_image", "image is not valid base64".to_string())
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy_m: Option<f64>,
}

/// The user's photo, with a MIME type sniffed from its leading bytes.
#[derive(Clone)]
pub struct SourceImage {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
}

impl fmt::Debug for SourceImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceImage")
            .field("len", &self.bytes.len())
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

impl SourceImage {
    pub fn new(bytes: Vec<u8>) -> Self {
        let mime_type = sniff_mime(&bytes);
        Self { bytes, mime_type }
    }

    pub fn extension(&self) -> &'static str {
        match self.mime_type {
            "image/jpeg" => "jpg",
            "image/webp" => "webp",
            _ => "png",
        }
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, STANDARD.encode(&self.bytes))
    }
}

/// Unknown formats are labelled PNG and left for the upstream to judge.
fn sniff_mime(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        "image/webp"
    } else {
        "image/png"
    }
}

/// A fully validated generation request.
#[derive(Debug, Clone)]
pub struct YardInput {
    pub image: SourceImage,
    pub location: Option<Location>,
    pub zip_code: Option<String>,
    pub budget: Tier,
    pub upkeep: Tier,
}

impl YardInput {
    /// Expects `params` to have passed [`YardParams::check`].
    pub fn new(
        image: Vec<u8>,
        params: YardParams,
        max_image_bytes: usize,
    ) -> Result<Self, AppError> {
        if image.is_empty() {
            return Err(AppError::InvalidInput(
                "invalid_image",
                "image decodes to zero bytes".to_string(),
            ));
        }
        if image.len() > max_image_bytes {
            return Err(AppError::PayloadTooLarge(format!(
                "image is {} bytes; the limit is {} bytes",
                image.len(),
                max_image_bytes
            )));
        }

        Ok(Self {
            image: SourceImage::new(image),
            location: params.location(),
            zip_code: params.normalized_zip(),
            budget: params.budget,
            upkeep: params.upkeep,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    fn request(body: serde_json::Value) -> GenerationRequest {
        serde_json::from_value(body).unwrap()
    }

    fn error_code(result: Result<YardInput, AppError>) -> &'static str {
        result.unwrap_err().code()
    }

    #[test]
    fn accepts_short_coordinate_aliases() {
        let input = request(json!({
            "image": STANDARD.encode(PNG_MAGIC),
            "lat": 37.77,
            "lng": -122.41
        }))
        .into_input(1024)
        .unwrap();

        let location = input.location.unwrap();
        assert_eq!(location.latitude, 37.77);
        assert_eq!(location.longitude, -122.41);
        assert_eq!(input.budget, Tier::Medium);
        assert_eq!(input.image.mime_type, "image/png");
    }

    #[test]
    fn missing_image_is_a_validation_failure() {
        let result = request(json!({ "latitude": 1.0, "longitude": 2.0 })).into_input(1024);
        let err = result.unwrap_err();
        assert_eq!(err.code(), "validation_failed");
        assert!(err.to_string().contains("image is required"));
    }

    #[test]
    fn negative_accuracy_reports_its_own_message() {
        let result = request(json!({
            "image": STANDARD.encode(PNG_MAGIC),
            "latitude": 1.0,
            "longitude": 2.0,
            "accuracyM": -5.0
        }))
        .into_input(1024);
        let err = result.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput("validation_failed", _)));
        assert!(err.to_string().contains("accuracyM must not be negative"));
    }

    #[test]
    fn empty_image_fails_before_coordinates() {
        let result = request(json!({ "image": "", "latitude": 120.0, "longitude": 0.0 }))
            .into_input(1024);
        let err = result.unwrap_err();
        assert_eq!(err.code(), "validation_failed");
        assert!(err.to_string().contains("image"));
    }

    #[test]
    fn out_of_range_coordinates_are_rejected() {
        let image = STANDARD.encode(PNG_MAGIC);

        let err = request(json!({ "image": image, "latitude": 90.5, "longitude": 0.0 }))
            .into_input(1024)
            .unwrap_err();
        assert!(err.to_string().contains("latitude must be between -90 and 90"));

        let err = request(json!({ "image": image, "latitude": 0.0, "longitude": -180.01 }))
            .into_input(1024)
            .unwrap_err();
        assert!(err.to_string().contains("longitude must be between -180 and 180"));
    }

    #[test]
    fn range_bounds_are_inclusive() {
        let input = request(json!({
            "image": STANDARD.encode(PNG_MAGIC),
            "latitude": -90.0,
            "longitude": 180.0
        }))
        .into_input(1024)
        .unwrap();
        assert!(input.location.is_some());
    }

    #[test]
    fn half_a_location_is_rejected() {
        let result = request(json!({ "image": STANDARD.encode(PNG_MAGIC), "latitude": 10.0 }))
            .into_input(1024);
        assert_eq!(error_code(result), "validation_failed");
    }

    #[test]
    fn invalid_base64_is_reported_as_invalid_image() {
        let result = request(json!({ "image": "not base64!!" })).into_input(1024);
        assert_eq!(error_code(result), "invalid_image");
    }

    #[test]
    fn data_url_prefix_and_line_breaks_are_tolerated() {
        let encoded = STANDARD.encode([0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46]);
        let (head, tail) = encoded.split_at(4);
        let wrapped = format!("data:image/jpeg;base64,{}\n{}", head, tail);

        let input = request(json!({ "image": wrapped })).into_input(1024).unwrap();
        assert_eq!(input.image.mime_type, "image/jpeg");
        assert_eq!(input.image.extension(), "jpg");
    }

    #[test]
    fn oversized_image_is_payload_too_large() {
        let result = request(json!({ "image": STANDARD.encode([0u8; 64]) })).into_input(32);
        assert_eq!(error_code(result), "payload_too_large");
    }

    #[test]
    fn blank_zip_is_dropped_and_tiers_parse() {
        let input = request(json!({
            "image": STANDARD.encode(PNG_MAGIC),
            "zipCode": "  ",
            "budget": "low",
            "upkeep": "high"
        }))
        .into_input(1024)
        .unwrap();

        assert!(input.zip_code.is_none());
        assert_eq!(input.budget, Tier::Low);
        assert_eq!(input.upkeep, Tier::High);
        assert_eq!(input.budget.budget_targets().max_usd, 250);
    }

    #[test]
    fn unknown_tier_is_a_deserialization_error() {
        let parsed = serde_json::from_value::<GenerationRequest>(json!({
            "image": "AAAA",
            "budget": "lavish"
        }));
        assert!(parsed.is_err());
        assert!("lavish".parse::<Tier>().is_err());
        assert_eq!(" High ".parse::<Tier>().unwrap(), Tier::High);
    }
}
