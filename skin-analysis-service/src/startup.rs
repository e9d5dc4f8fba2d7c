//! Application startup and lifecycle management.

use crate::config::AnalysisConfig;
use crate::handlers::{analyses, health, metrics::metrics_handler, sessions};
use crate::middleware::metrics_middleware;
use crate::services::providers::gemini::{GeminiConfig, GeminiImageProvider, GeminiVisionProvider};
use crate::services::providers::{ImageProvider, VisionProvider};
use crate::services::AnalysisService;
use crate::session::SessionStore;
use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    security_headers::security_headers_middleware,
    tracing::{request_id_middleware, REQUEST_ID_HEADER},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;

/// Room for multipart boundaries and the `source` field on top of the file itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: AnalysisConfig,
    pub analysis: Arc<AnalysisService>,
    pub sessions: SessionStore,
}

impl AppState {
    pub fn new(config: AnalysisConfig, analysis: AnalysisService) -> Self {
        let sessions = SessionStore::new(config.limits.max_upload_bytes);
        Self {
            config,
            analysis: Arc::new(analysis),
            sessions,
        }
    }

    /// State backed by the Google Generative Language API.
    pub fn from_config(config: AnalysisConfig) -> Result<Self, AppError> {
        let gemini = |model: &str| GeminiConfig {
            api_key: config.google.api_key.clone(),
            api_base: config.google.api_base.clone(),
            model: model.to_string(),
            timeout: config.request_timeout(),
        };

        let vision: Arc<dyn VisionProvider> = Arc::new(
            GeminiVisionProvider::new(gemini(&config.models.text_model))
                .map_err(|e| AppError::ConfigError(anyhow::Error::new(e)))?,
        );
        let images: Arc<dyn ImageProvider> = Arc::new(
            GeminiImageProvider::new(gemini(&config.models.image_model))
                .map_err(|e| AppError::ConfigError(anyhow::Error::new(e)))?,
        );

        tracing::info!(
            text_model = %config.models.text_model,
            image_model = %config.models.image_model,
            api_base = %config.google.api_base,
            "Initialized Gemini providers"
        );

        Ok(Self::new(config, AnalysisService::new(vision, images)))
    }
}

/// Build the HTTP router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.limits.max_upload_bytes + MULTIPART_OVERHEAD_BYTES;

    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(metrics_handler))
        .route("/api/analyses", post(analyses::create_analysis))
        .route("/api/sessions", post(sessions::create_session))
        .route(
            "/api/sessions/:id",
            get(sessions::get_session).delete(sessions::delete_session),
        )
        .route(
            "/api/sessions/:id/image",
            post(sessions::upload_image).delete(sessions::remove_image),
        )
        .route("/api/sessions/:id/drag", post(sessions::set_drag))
        .route("/api/sessions/:id/analyze", post(sessions::analyze))
        .route(
            "/api/sessions/:id/healing-images/:index",
            get(sessions::healing_image),
        )
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
}

/// Application container for managing server lifecycle.
pub struct Application {
    http_port: u16,
    http_listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: AnalysisConfig) -> Result<Self, AppError> {
        let state = AppState::from_config(config)?;
        Self::build_with_state(state).await
    }

    /// Build around prepared state, e.g. with mock providers.
    pub async fn build_with_state(state: AppState) -> Result<Self, AppError> {
        // Port 0 picks a random port for testing
        let address = state.config.common.address();
        let http_listener = TcpListener::bind(&address).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", address, e);
            AppError::from(e)
        })?;
        let http_port = http_listener.local_addr()?.port();

        tracing::info!("Skin analysis service listening on port {}", http_port);

        Ok(Self {
            http_port,
            http_listener,
            state,
        })
    }

    /// Get the HTTP port the server is listening on.
    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Run the application until a shutdown signal arrives.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let sweeper = self
            .state
            .sessions
            .spawn_sweeper(self.state.config.session_idle_timeout());

        let router = build_router(self.state);
        let result = axum::serve(self.http_listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await;

        sweeper.abort();

        if let Err(e) = &result {
            tracing::error!("HTTP server error: {}", e);
        }
        result
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
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
