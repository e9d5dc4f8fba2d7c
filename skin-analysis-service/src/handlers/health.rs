use crate::startup::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Default, Deserialize)]
pub struct ReadyParams {
    /// Also ask both model backends whether they answer.
    #[serde(default)]
    pub deep: bool,
}

/// Liveness probe.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "skin-analysis-service",
        "version": env!("CARGO_PKG_VERSION"),
        "models": {
            "diagnosis": state.analysis.vision_provider().model(),
            "healingImages": state.analysis.image_provider().model(),
        },
        "activeSessions": state.sessions.len(),
    }))
}

/// Readiness probe. Not ready until a real API key is configured.
pub async fn readiness_check(
    State(state): State<AppState>,
    Query(params): Query<ReadyParams>,
) -> impl IntoResponse {
    if state.config.has_placeholder_api_key() {
        tracing::warn!("Readiness check failed: API key is not configured");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "unavailable", "reason": "api key not configured" })),
        );
    }

    if params.deep {
        let (vision, images) = tokio::join!(
            state.analysis.vision_provider().health_check(),
            state.analysis.image_provider().health_check()
        );
        if let Err(e) = vision.and(images) {
            tracing::warn!(error = %e, "Readiness check failed: provider unavailable");
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable", "reason": e.to_string() })),
            );
        }
    }

    tracing::debug!("Readiness check passed");
    (StatusCode::OK, Json(json!({ "status": "ready" })))
}
