use super::upload::read_upload_form;
use crate::models::FullAnalysis;
use crate::session::{AnalysisSession, ANALYSIS_FAILED_MESSAGE};
use crate::startup::AppState;
use axum::{
    extract::{Multipart, State},
    Json,
};
use service_core::error::AppError;

/// One-shot analysis: validate the uploaded image, diagnose it and
/// generate the healing visuals without keeping any state.
pub async fn create_analysis(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<FullAnalysis>, AppError> {
    let form = read_upload_form(multipart).await?;
    let file = form
        .file
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("No file uploaded")))?;

    let mut scratch = AnalysisSession::new(state.config.limits.max_upload_bytes);
    scratch.process_file(file)?;
    let ticket = scratch.begin_analysis()?;

    let analysis = state
        .analysis
        .get_analysis_and_healing_visuals(&ticket.image_base64, ticket.mime_type)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "One-shot analysis failed");
            AppError::BadGateway(ANALYSIS_FAILED_MESSAGE.to_string())
        })?;

    Ok(Json(analysis))
}
