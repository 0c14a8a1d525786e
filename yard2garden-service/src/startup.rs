//! Application startup and lifecycle management.
//!
//! Resolves the upstream credential once, wires the router, and runs the
//! HTTP server until SIGINT or SIGTERM.

use crate::config::{GardenConfig, ProviderKind};
use crate::handlers::{
    analyze::analyze_yard,
    generate::generate_garden,
    health::{health_check, liveness},
    metrics::metrics_handler,
};
use crate::services::metrics::{init_metrics, metrics_middleware};
use crate::services::providers::mock::MockProvider;
use crate::services::providers::openai::{OpenAiConfig, OpenAiProvider};
use crate::services::{resolve_credential, GcpSecretManager, GenerationClient};
use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::{header, HeaderName, HeaderValue, Method, Request},
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    http_span, request_id_middleware, security_headers_middleware, REQUEST_ID_HEADER,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

/// Shared application state. Immutable after startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GardenConfig>,
    /// `None` when no credential could be resolved outside prod; generation
    /// routes then answer `configuration_error`.
    pub generator: Option<Arc<GenerationClient>>,
}

/// Builds the full router: routes, body limit, metrics, tracing, request id,
/// security headers and CORS.
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.generation.body_limit_bytes();
    let cors = cors_layer(&state.config.cors.allowed_origins);

    Router::new()
        .route("/", get(liveness))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .route("/v1/yard2garden", post(generate_garden))
        .route("/analyze-yard", post(analyze_yard))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<Body>| http_span(request)),
        )
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(cors)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origin = if allowed_origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(origin = %origin, "Ignoring unparseable CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, request_id.clone()])
        .expose_headers([request_id])
        .max_age(Duration::from_secs(3600))
}

/// Builds the generation client for the configured provider.
///
/// A credential failure is returned as-is in prod; elsewhere it is logged and
/// the service starts without a generator.
pub async fn build_generator(
    config: &GardenConfig,
) -> Result<Option<Arc<GenerationClient>>, AppError> {
    let timeout = config.generation.timeout;

    match config.generation.provider {
        ProviderKind::Mock => {
            tracing::warn!("Using mock generation provider");
            let provider = Arc::new(MockProvider::default());
            Ok(Some(Arc::new(GenerationClient::new(
                provider.clone(),
                provider,
                timeout,
            ))))
        }
        ProviderKind::OpenAi => {
            let store = GcpSecretManager::new(
                reqwest::Client::builder()
                    .timeout(Duration::from_secs(10))
                    .build()
                    .map_err(|e| AppError::InternalError(e.into()))?,
                &config.credential.metadata_base_url(),
                config.credential.project_id.clone(),
            );

            let api_key = match resolve_credential(
                config.credential.api_key.as_ref(),
                config.credential.secret_name.as_deref(),
                &store,
            )
            .await
            {
                Ok(key) => key,
                Err(e) if !config.common.is_prod() => {
                    tracing::warn!(
                        error = %e,
                        environment = %config.common.environment,
                        "No upstream credential; generation routes will return configuration_error"
                    );
                    return Ok(None);
                }
                Err(e) => return Err(e),
            };

            let provider = Arc::new(
                OpenAiProvider::new(OpenAiConfig {
                    api_key,
                    base_url: config.openai.base_url.clone(),
                    plan_model: config.openai.plan_model.clone(),
                    image_model: config.openai.image_model.clone(),
                    image_size: config.openai.image_size.clone(),
                    request_timeout: timeout,
                })
                .map_err(|e| AppError::ConfigError(e.into()))?,
            );

            tracing::info!(
                plan_model = %config.openai.plan_model,
                image_model = %config.openai.image_model,
                "Initialized OpenAI provider"
            );

            Ok(Some(Arc::new(GenerationClient::new(
                provider.clone(),
                provider,
                timeout,
            ))))
        }
    }
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: GardenConfig) -> Result<Self, AppError> {
        let generator = build_generator(&config).await.map_err(|e| {
            tracing::error!("Failed to initialize generation: {}", e);
            e
        })?;

        let state = AppState {
            config: Arc::new(config),
            generator,
        };
        Self::build_with_state(state).await
    }

    /// Build around an already assembled state, e.g. one holding test providers.
    pub async fn build_with_state(state: AppState) -> Result<Self, AppError> {
        init_metrics();

        // Port 0 binds a random port for testing
        let addr = SocketAddr::from(([0, 0, 0, 0], state.config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(
            port,
            environment = %state.config.common.environment,
            generation_ready = state.generator.is_some(),
            "yard2garden service listening"
        );

        Ok(Self {
            port,
            listener,
            router: build_router(state),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
