use super::upload::read_upload_form;
use crate::models::UploadSource;
use crate::session::{AnalysisOutcome, SessionEntry, SessionView, UploadRejection};
use crate::startup::AppState;
use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Deserialize;
use service_core::error::AppError;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct DragRequest {
    pub over: bool,
}

fn find_session(state: &AppState, id: Uuid) -> Result<Arc<SessionEntry>, AppError> {
    state
        .sessions
        .get(&id)
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Session {} not found", id)))
}

pub async fn create_session(State(state): State<AppState>) -> (StatusCode, Json<SessionView>) {
    let entry = state.sessions.create();
    tracing::info!(session_id = %entry.id(), "Session started");
    (StatusCode::CREATED, Json(entry.view()))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    let entry = find_session(&state, id)?;
    Ok(Json(entry.view()))
}

pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if !state.sessions.remove(&id) {
        return Err(AppError::NotFound(anyhow::anyhow!(
            "Session {} not found",
            id
        )));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Picker selection or drop of a new image.
pub async fn upload_image(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Result<Json<SessionView>, AppError> {
    let entry = find_session(&state, id)?;
    let form = match read_upload_form(multipart).await {
        Ok(form) => form,
        // The body limit fired mid-read; the session still has to show why
        Err(AppError::PayloadTooLarge(_)) => {
            let e = entry.with(|s| s.reject_oversized_upload());
            tracing::info!(session_id = %id, error = %e, "Upload rejected by body limit");
            return Err(e.into());
        }
        Err(e) => return Err(e),
    };

    let result = entry.with(|s| match form.source {
        UploadSource::Picker => s.handle_file_select(form.file),
        UploadSource::Drop => s.handle_drop(form.file),
    });

    if let Err(e) = result {
        let content_type = e.rejection().and_then(UploadRejection::content_type);
        tracing::info!(
            session_id = %id,
            error = %e,
            content_type = content_type.unwrap_or_default(),
            "Upload rejected"
        );
        return Err(e.into());
    }

    Ok(Json(entry.view()))
}

pub async fn remove_image(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    let entry = find_session(&state, id)?;
    entry.with(|s| s.remove_image());
    Ok(Json(entry.view()))
}

pub async fn set_drag(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DragRequest>,
) -> Result<Json<SessionView>, AppError> {
    let entry = find_session(&state, id)?;
    entry.with(|s| {
        if payload.over {
            s.handle_drag_over()
        } else {
            s.handle_drag_leave()
        }
    });
    Ok(Json(entry.view()))
}

/// Run the analysis for the session's current image.
///
/// The work runs on its own task so a client disconnect does not leave
/// the session stuck in the loading state.
pub async fn analyze(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let entry = find_session(&state, id)?;

    let task_entry = entry.clone();
    let service = state.analysis.clone();
    let outcome = tokio::spawn(async move { task_entry.run_analysis(&service).await })
        .await
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("Analysis task failed: {}", e)))??;

    let status = match outcome {
        AnalysisOutcome::Failed => StatusCode::BAD_GATEWAY,
        AnalysisOutcome::Completed | AnalysisOutcome::Discarded => StatusCode::OK,
    };
    Ok((status, Json(entry.view())))
}

/// Decoded bytes of one healing image, in treatment-step order.
pub async fn healing_image(
    State(state): State<AppState>,
    Path((id, index)): Path<(Uuid, usize)>,
) -> Result<impl IntoResponse, AppError> {
    let entry = find_session(&state, id)?;

    let (encoded, mime_type) = entry
        .with(|s| {
            s.full_analysis()
                .and_then(|analysis| analysis.healing_image(index))
                .map(|(data, mime_type)| (data.to_string(), mime_type.to_string()))
        })
        .ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("No healing image at index {}", index))
        })?;

    let bytes = BASE64.decode(encoded.as_bytes()).map_err(|e| {
        AppError::InternalError(anyhow::anyhow!("Stored healing image is not valid base64: {}", e))
    })?;

    Ok(([(header::CONTENT_TYPE, mime_type)], bytes))
}
