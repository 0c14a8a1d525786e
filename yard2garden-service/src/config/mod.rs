use secrecy::Secret;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Default cap on the decoded upload (8 MiB).
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 8 * 1024 * 1024;

/// Largest accepted `MAX_IMAGE_BYTES` (64 MiB).
pub const MAX_IMAGE_BYTES_CEILING: usize = 64 * 1024 * 1024;

const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 120;
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_METADATA_HOST: &str = "metadata.google.internal";

/// Service configuration, built once at startup and shared read-only.
#[derive(Debug, Clone)]
pub struct GardenConfig {
    pub common: core_config::Config,
    pub credential: CredentialConfig,
    pub openai: OpenAiSettings,
    pub generation: GenerationSettings,
    pub cors: CorsSettings,
}

/// Where the upstream API key comes from.
#[derive(Debug, Clone)]
pub struct CredentialConfig {
    /// `OPENAI_API_KEY`, preferred when non-empty.
    pub api_key: Option<Secret<String>>,
    /// `OPENAI_API_KEY_SECRET`: secret id or full Secret Manager resource name.
    pub secret_name: Option<String>,
    pub project_id: Option<String>,
    pub metadata_host: String,
}

impl CredentialConfig {
    pub fn metadata_base_url(&self) -> String {
        if self.metadata_host.starts_with("http://") || self.metadata_host.starts_with("https://")
        {
            self.metadata_host.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", self.metadata_host.trim_end_matches('/'))
        }
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    pub base_url: String,
    pub plan_model: String,
    pub image_model: String,
    pub image_size: String,
}

#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub provider: ProviderKind,
    pub timeout: Duration,
    pub max_image_bytes: usize,
}

impl GenerationSettings {
    /// Request body cap: base64 inflates by 4/3, plus room for the other fields.
    pub fn body_limit_bytes(&self) -> usize {
        (self.max_image_bytes / 3)
            .saturating_mul(4)
            .saturating_add(4 + 64 * 1024)
    }
}

#[derive(Debug, Clone)]
pub struct CorsSettings {
    /// Empty means any origin.
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    Mock,
}

impl FromStr for ProviderKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "mock" => Ok(ProviderKind::Mock),
            other => Err(AppError::ConfigError(anyhow::anyhow!(
                "GENERATION_PROVIDER must be 'openai' or 'mock', got '{}'",
                other
            ))),
        }
    }
}

impl GardenConfig {
    pub fn load() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        Self::from_lookup(common, |key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; `load` passes the process environment.
    pub fn from_lookup<F>(common: core_config::Config, lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = EnvReader {
            lookup,
            is_prod: common.is_prod(),
        };

        Ok(GardenConfig {
            credential: CredentialConfig {
                api_key: vars.optional("OPENAI_API_KEY").map(Secret::new),
                secret_name: vars.optional("OPENAI_API_KEY_SECRET"),
                project_id: vars
                    .optional("GOOGLE_CLOUD_PROJECT")
                    .or_else(|| vars.optional("GCP_PROJECT")),
                metadata_host: vars.get("GCE_METADATA_HOST", Some(DEFAULT_METADATA_HOST))?,
            },
            openai: OpenAiSettings {
                base_url: vars
                    .get("OPENAI_BASE_URL", Some(DEFAULT_OPENAI_BASE_URL))?
                    .trim_end_matches('/')
                    .to_string(),
                plan_model: vars.get("OPENAI_PLAN_MODEL", Some("gpt-5.2"))?,
                image_model: vars.get("OPENAI_IMAGE_MODEL", Some("gpt-image-1.5"))?,
                image_size: vars.get("OPENAI_IMAGE_SIZE", Some("1024x1024"))?,
            },
            generation: GenerationSettings {
                provider: vars.get("GENERATION_PROVIDER", Some("openai"))?.parse()?,
                timeout: Duration::from_secs(
                    vars.parse("UPSTREAM_TIMEOUT_SECS", DEFAULT_UPSTREAM_TIMEOUT_SECS)?,
                ),
                max_image_bytes: max_image_bytes(
                    vars.parse("MAX_IMAGE_BYTES", DEFAULT_MAX_IMAGE_BYTES)?,
                )?,
            },
            cors: CorsSettings {
                allowed_origins: parse_origins(vars.optional("CORS_ALLOWED_ORIGINS")),
            },
            common,
        })
    }
}

fn max_image_bytes(value: usize) -> Result<usize, AppError> {
    if value == 0 || value > MAX_IMAGE_BYTES_CEILING {
        return Err(AppError::ConfigError(anyhow::anyhow!(
            "MAX_IMAGE_BYTES must be between 1 and {}, got {}",
            MAX_IMAGE_BYTES_CEILING,
            value
        )));
    }
    Ok(value)
}

fn parse_origins(raw: Option<String>) -> Vec<String> {
    let origins: Vec<String> = raw
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(str::to_string)
        .collect();

    if origins.iter().any(|o| o == "*") {
        Vec::new()
    } else {
        origins
    }
}

struct EnvReader<F> {
    lookup: F,
    is_prod: bool,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Trimmed value; blank counts as unset.
    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// Settings with a default fall back to it everywhere except production,
    /// where every setting that has no default must be explicit.
    fn get(&self, key: &str, default: Option<&str>) -> Result<String, AppError> {
        match (self.optional(key), default) {
            (Some(val), _) => Ok(val),
            (None, Some(def)) => Ok(def.to_string()),
            (None, None) if self.is_prod => Err(AppError::ConfigError(anyhow::anyhow!(
                "{} is required in production but not set",
                key
            ))),
            (None, None) => Err(AppError::ConfigError(anyhow::anyhow!(
                "{} is required but not set",
                key
            ))),
        }
    }

    fn parse<T>(&self, key: &str, default: T) -> Result<T, AppError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(key) {
            Some(raw) => raw.parse().map_err(|e| {
                AppError::ConfigError(anyhow::anyhow!("{} has invalid value '{}': {}", key, raw, e))
            }),
            None => Ok(default),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn common() -> core_config::Config {
        core_config::Config {
            port: 0,
            environment: "test".to_string(),
        }
    }

    fn config_from(pairs: &[(&str, &str)]) -> Result<GardenConfig, AppError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        GardenConfig::from_lookup(common(), |key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_cover_everything_but_the_credential() {
        let config = config_from(&[]).unwrap();

        assert!(config.credential.api_key.is_none());
        assert!(config.credential.secret_name.is_none());
        assert_eq!(config.openai.base_url, "https://api.openai.com/v1");
        assert_eq!(config.openai.plan_model, "gpt-5.2");
        assert_eq!(config.openai.image_model, "gpt-image-1.5");
        assert_eq!(config.generation.provider, ProviderKind::OpenAi);
        assert_eq!(config.generation.timeout, Duration::from_secs(120));
        assert_eq!(config.generation.max_image_bytes, DEFAULT_MAX_IMAGE_BYTES);
        assert!(config.cors.allowed_origins.is_empty());
    }

    #[test]
    fn blank_api_key_counts_as_unset() {
        let config = config_from(&[("OPENAI_API_KEY", "   ")]).unwrap();
        assert!(config.credential.api_key.is_none());

        let config = config_from(&[("OPENAI_API_KEY", " sk-test ")]).unwrap();
        assert_eq!(
            config.credential.api_key.unwrap().expose_secret(),
            "sk-test"
        );
    }

    #[test]
    fn cors_origins_are_split_and_wildcard_means_any() {
        let config = config_from(&[(
            "CORS_ALLOWED_ORIGINS",
            "https://a.example, https://b.example,,",
        )])
        .unwrap();
        assert_eq!(
            config.cors.allowed_origins,
            vec!["https://a.example", "https://b.example"]
        );

        let config = config_from(&[("CORS_ALLOWED_ORIGINS", "https://a.example,*")]).unwrap();
        assert!(config.cors.allowed_origins.is_empty());
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let err = config_from(&[("UPSTREAM_TIMEOUT_SECS", "soon")]).unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }

    #[test]
    fn unknown_provider_is_rejected() {
        assert!(config_from(&[("GENERATION_PROVIDER", "dall-e")]).is_err());

        let config = config_from(&[("GENERATION_PROVIDER", "Mock")]).unwrap();
        assert_eq!(config.generation.provider, ProviderKind::Mock);
    }

    #[test]
    fn metadata_host_gets_a_scheme() {
        let config = config_from(&[]).unwrap();
        assert_eq!(
            config.credential.metadata_base_url(),
            "http://metadata.google.internal"
        );

        let config = config_from(&[("GCE_METADATA_HOST", "http://127.0.0.1:9000/")]).unwrap();
        assert_eq!(config.credential.metadata_base_url(), "http://127.0.0.1:9000");
    }

    #[test]
    fn body_limit_leaves_room_for_base64() {
        let settings = GenerationSettings {
            provider: ProviderKind::Mock,
            timeout: Duration::from_secs(1),
            max_image_bytes: 3 * 1024,
        };
        assert!(settings.body_limit_bytes() > 4 * 1024);
    }

    #[test]
    fn out_of_range_image_cap_is_rejected() {
        let huge = usize::MAX.to_string();
        let err = config_from(&[("MAX_IMAGE_BYTES", huge.as_str())]).unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));

        let err = config_from(&[("MAX_IMAGE_BYTES", "0")]).unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));

        let config = config_from(&[("MAX_IMAGE_BYTES", "64")]).unwrap();
        assert_eq!(config.generation.max_image_bytes, 64);
    }

    #[test]
    fn body_limit_saturates_instead_of_overflowing() {
        let settings = GenerationSettings {
            provider: ProviderKind::Mock,
            timeout: Duration::from_secs(1),
            max_image_bytes: usize::MAX,
        };
        assert_eq!(settings.body_limit_bytes(), usize::MAX);
    }
}
