//! Upstream credential resolution: environment first, Secret Manager second.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use service_core::error::AppError;
use thiserror::Error;

const SECRET_MANAGER_API_BASE: &str = "https://secretmanager.googleapis.com";
const TOKEN_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/token";
const PROJECT_ID_PATH: &str = "/computeMetadata/v1/project/project-id";

#[derive(Debug, Error)]
pub enum SecretStoreError {
    #[error("secret store request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("secret store returned status {status} for {what}")]
    Status { status: u16, what: &'static str },

    #[error("secret payload is malformed: {0}")]
    Malformed(String),

    #[error("secret reference '{0}' needs a project id")]
    MissingProject(String),
}

/// Named secret lookup.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn access(&self, name: &str) -> Result<String, SecretStoreError>;
}

/// Returns the env value when it is non-blank and never touches the store in
/// that case; otherwise looks `secret_name` up.
pub async fn resolve_credential(
    env_value: Option<&Secret<String>>,
    secret_name: Option<&str>,
    store: &dyn SecretStore,
) -> Result<Secret<String>, AppError> {
    if let Some(value) = env_value {
        let trimmed = value.expose_secret().trim();
        if !trimmed.is_empty() {
            tracing::info!(source = "environment", "Resolved upstream credential");
            return Ok(Secret::new(trimmed.to_string()));
        }
    }

    let name = secret_name.map(str::trim).filter(|n| !n.is_empty()).ok_or_else(|| {
        AppError::ConfigError(anyhow::anyhow!(
            "neither OPENAI_API_KEY nor OPENAI_API_KEY_SECRET is set"
        ))
    })?;

    let value = store.access(name).await.map_err(|e| {
        AppError::ConfigError(anyhow::anyhow!("secret '{}' could not be read: {}", name, e))
    })?;

    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::ConfigError(anyhow::anyhow!(
            "secret '{}' is empty",
            name
        )));
    }

    tracing::info!(source = "secret_manager", secret = %name, "Resolved upstream credential");
    Ok(Secret::new(trimmed.to_string()))
}

/// Google Secret Manager over REST, authenticated through the metadata server.
pub struct GcpSecretManager {
    client: Client,
    metadata_base: String,
    api_base: String,
    project_id: Option<String>,
}

impl GcpSecretManager {
    pub fn new(client: Client, metadata_base: &str, project_id: Option<String>) -> Self {
        Self {
            client,
            metadata_base: metadata_base.trim_end_matches('/').to_string(),
            api_base: SECRET_MANAGER_API_BASE.to_string(),
            project_id,
        }
    }

    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    async fn metadata(
        &self,
        path: &str,
        what: &'static str,
    ) -> Result<reqwest::Response, SecretStoreError> {
        let response = self
            .client
            .get(format!("{}{}", self.metadata_base, path))
            .header("Metadata-Flavor", "Google")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SecretStoreError::Status {
                status: response.status().as_u16(),
                what,
            });
        }
        Ok(response)
    }

    async fn access_token(&self) -> Result<String, SecretStoreError> {
        let token: MetadataToken = self
            .metadata(TOKEN_PATH, "access token")
            .await?
            .json()
            .await?;
        Ok(token.access_token)
    }

    async fn resolve_project(&self) -> Result<Option<String>, SecretStoreError> {
        if self.project_id.is_some() {
            return Ok(self.project_id.clone());
        }
        let project = self
            .metadata(PROJECT_ID_PATH, "project id")
            .await?
            .text()
            .await?;
        let project = project.trim();
        Ok((!project.is_empty()).then(|| project.to_string()))
    }
}

/// Full resource path of the secret version to read.
fn resource_path(name: &str, project_id: Option<&str>) -> Result<String, SecretStoreError> {
    if name.starts_with("projects/") {
        if name.contains("/versions/") {
            return Ok(name.to_string());
        }
        return Ok(format!("{}/versions/latest", name));
    }

    let project = project_id.ok_or_else(|| SecretStoreError::MissingProject(name.to_string()))?;
    Ok(format!(
        "projects/{}/secrets/{}/versions/latest",
        project, name
    ))
}

#[async_trait]
impl SecretStore for GcpSecretManager {
    async fn access(&self, name: &str) -> Result<String, SecretStoreError> {
        let resource = if name.starts_with("projects/") {
            resource_path(name, None)?
        } else {
            resource_path(name, self.resolve_project().await?.as_deref())?
        };

        let token = self.access_token().await?;
        let response = self
            .client
            .get(format!("{}/v1/{}:access", self.api_base, resource))
            .bearer_auth(token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SecretStoreError::Status {
                status: response.status().as_u16(),
                what: "secret version",
            });
        }

        let version: AccessSecretVersionResponse = response.json().await?;
        let bytes = STANDARD
            .decode(version.payload.data.as_bytes())
            .map_err(|e| SecretStoreError::Malformed(e.to_string()))?;

        String::from_utf8(bytes).map_err(|e| SecretStoreError::Malformed(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct MetadataToken {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct AccessSecretVersionResponse {
    payload: SecretPayload,
}

#[derive(Debug, Deserialize)]
struct SecretPayload {
    data: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct CountingStore {
        value: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl CountingStore {
        fn new(value: Option<&'static str>) -> Self {
            Self {
                value,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SecretStore for CountingStore {
        async fn access(&self, name: &str) -> Result<String, SecretStoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.value
                .map(str::to_string)
                .ok_or_else(|| SecretStoreError::MissingProject(name.to_string()))
        }
    }

    #[tokio::test]
    async fn env_value_wins_without_touching_the_store() {
        let store = CountingStore::new(Some("from-store"));
        let env = Secret::new("from-env".to_string());

        let key = resolve_credential(Some(&env), Some("openai-key"), &store)
            .await
            .unwrap();

        assert_eq!(key.expose_secret(), "from-env");
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn blank_env_value_falls_back_to_store() {
        let store = CountingStore::new(Some(" from-store\n"));
        let env = Secret::new("  ".to_string());

        let key = resolve_credential(Some(&env), Some("openai-key"), &store)
            .await
            .unwrap();

        assert_eq!(key.expose_secret(), "from-store");
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn no_source_is_a_configuration_error() {
        let store = CountingStore::new(None);

        let err = resolve_credential(None, None, &store).await.unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));

        let err = resolve_credential(None, Some("openai-key"), &store)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }

    #[test]
    fn resource_paths_are_expanded() {
        assert_eq!(
            resource_path("openai-key", Some("garden")).unwrap(),
            "projects/garden/secrets/openai-key/versions/latest"
        );
        assert_eq!(
            resource_path("projects/p/secrets/s", None).unwrap(),
            "projects/p/secrets/s/versions/latest"
        );
        assert_eq!(
            resource_path("projects/p/secrets/s/versions/3", None).unwrap(),
            "projects/p/secrets/s/versions/3"
        );
        assert!(matches!(
            resource_path("openai-key", None),
            Err(SecretStoreError::MissingProject(_))
        ));
    }

    #[tokio::test]
    async fn reads_secret_through_metadata_token() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(TOKEN_PATH))
            .and(header("Metadata-Flavor", "Google"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "ya29.token",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(PROJECT_ID_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("garden-prod"))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(
                "/v1/projects/garden-prod/secrets/openai-key/versions/latest:access",
            ))
            .and(header("authorization", "Bearer ya29.token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "projects/1/secrets/openai-key/versions/4",
                "payload": { "data": STANDARD.encode("sk-from-manager") }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = GcpSecretManager::new(Client::new(), &server.uri(), None)
            .with_api_base(&server.uri());

        assert_eq!(store.access("openai-key").await.unwrap(), "sk-from-manager");
    }

    #[tokio::test]
    async fn permission_denied_is_reported() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(TOKEN_PATH))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "access_token": "t" })),
            )
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v1/projects/p/secrets/s/versions/latest:access"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let store = GcpSecretManager::new(Client::new(), &server.uri(), Some("p".to_string()))
            .with_api_base(&server.uri());

        let err = store.access("s").await.unwrap_err();
        assert!(matches!(err, SecretStoreError::Status { status: 403, .. }));
    }
}
