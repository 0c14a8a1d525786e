use crate::error::AppError;
use config::{Config as Cfg, File};
use serde::Deserialize;
use std::env;

/// Base settings shared by every service binary.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_environment")]
    pub environment: String,
}

fn default_port() -> u16 {
    8080
}

fn default_environment() -> String {
    "dev".to_string()
}

impl Config {
    /// Layers, lowest precedence first: `configuration` file, `APP__*`
    /// variables, then the platform's `PORT` and `ENVIRONMENT`.
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let config = Cfg::builder()
            .add_source(File::with_name("configuration").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .set_override_option("port", env::var("PORT").ok())?
            .set_override_option("environment", env::var("ENVIRONMENT").ok())?
            .build()?;

        Ok(config.try_deserialize()?)
    }

    pub fn is_prod(&self) -> bool {
        self.environment.eq_ignore_ascii_case("prod")
            || self.environment.eq_ignore_ascii_case("production")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prod_detection_is_case_insensitive() {
        let mut config = Config {
            port: 8080,
            environment: "PROD".to_string(),
        };
        assert!(config.is_prod());

        config.environment = "production".to_string();
        assert!(config.is_prod());

        config.environment = "dev".to_string();
        assert!(!config.is_prod());
    }

    #[test]
    fn defaults_apply_when_no_source_sets_them() {
        let config: Config = Cfg::builder()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.environment, "dev");
    }
}
