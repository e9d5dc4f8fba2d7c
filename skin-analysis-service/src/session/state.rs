//! Per-client upload and analysis state.
//!
//! Mirrors what the upload screen shows: the chosen image, whether an
//! analysis is running, the last error and the last result. All transitions
//! are synchronous; the remote call happens between `begin_analysis` and
//! `complete_analysis`, outside any lock.

use crate::models::{FullAnalysis, ImageMimeType, IncomingFile, UploadedImage};
use chrono::{DateTime, Utc};
use serde::Serialize;
use service_core::error::AppError;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

pub const INVALID_FILE_TYPE_MESSAGE: &str = "Invalid file type. Please upload a JPG or PNG image.";

pub const EMPTY_FILE_MESSAGE: &str = "The selected file is empty. Please upload a JPG or PNG image.";

pub const ANALYSIS_FAILED_MESSAGE: &str = "Failed to analyze the image. The API key may be invalid \
or the model may be unavailable. Please try again later.";

/// Why an upload was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadRejection {
    UnsupportedType(String),
    Empty,
    TooLarge { limit: usize },
}

impl UploadRejection {
    /// The content type that was refused, if the type was the problem.
    pub fn content_type(&self) -> Option<&str> {
        match self {
            UploadRejection::UnsupportedType(content_type) => Some(content_type),
            UploadRejection::Empty | UploadRejection::TooLarge { .. } => None,
        }
    }
}

impl fmt::Display for UploadRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadRejection::UnsupportedType(_) => f.write_str(INVALID_FILE_TYPE_MESSAGE),
            UploadRejection::Empty => f.write_str(EMPTY_FILE_MESSAGE),
            UploadRejection::TooLarge { limit } => write!(
                f,
                "File is too large. Please upload an image smaller than {} MB.",
                limit.div_ceil(1024 * 1024)
            ),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("{0}")]
    Rejected(UploadRejection),

    #[error("No image has been uploaded")]
    NoImage,

    #[error("An analysis is already running for this image")]
    AnalysisInProgress,
}

impl SessionError {
    pub fn rejection(&self) -> Option<&UploadRejection> {
        match self {
            SessionError::Rejected(rejection) => Some(rejection),
            SessionError::NoImage | SessionError::AnalysisInProgress => None,
        }
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        let message = err.to_string();
        match err {
            SessionError::Rejected(UploadRejection::UnsupportedType(_)) => {
                AppError::UnsupportedMediaType(message)
            }
            SessionError::Rejected(UploadRejection::TooLarge { .. }) => {
                AppError::PayloadTooLarge(message)
            }
            SessionError::Rejected(UploadRejection::Empty) | SessionError::NoImage => {
                AppError::BadRequest(anyhow::anyhow!(message))
            }
            SessionError::AnalysisInProgress => AppError::Conflict(anyhow::anyhow!(message)),
        }
    }
}

/// Handed out by `begin_analysis`; carries what the remote call needs.
#[derive(Debug, Clone)]
pub struct AnalysisTicket {
    pub image_base64: String,
    pub mime_type: ImageMimeType,
    generation: u64,
}

#[derive(Debug)]
pub struct AnalysisSession {
    image: Option<UploadedImage>,
    full_analysis: Option<FullAnalysis>,
    is_loading: bool,
    error: Option<String>,
    drag_over: bool,
    /// Bumped on every reset; tickets from older generations are stale.
    generation: u64,
    max_upload_bytes: usize,
}

impl AnalysisSession {
    pub fn new(max_upload_bytes: usize) -> Self {
        Self {
            image: None,
            full_analysis: None,
            is_loading: false,
            error: None,
            drag_over: false,
            generation: 0,
            max_upload_bytes,
        }
    }

    pub fn uploaded_image(&self) -> Option<&UploadedImage> {
        self.image.as_ref()
    }

    pub fn full_analysis(&self) -> Option<&FullAnalysis> {
        self.full_analysis.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn drag_over(&self) -> bool {
        self.drag_over
    }

    /// File chosen through the picker. No file is a no-op.
    pub fn handle_file_select(&mut self, file: Option<IncomingFile>) -> Result<(), SessionError> {
        match file {
            Some(file) => self.process_file(file),
            None => Ok(()),
        }
    }

    pub fn handle_drag_over(&mut self) {
        self.drag_over = true;
    }

    pub fn handle_drag_leave(&mut self) {
        self.drag_over = false;
    }

    /// File dropped on the upload area. Always ends the drag.
    pub fn handle_drop(&mut self, file: Option<IncomingFile>) -> Result<(), SessionError> {
        self.drag_over = false;
        match file {
            Some(file) => self.process_file(file),
            None => Ok(()),
        }
    }

    /// Validate and store a new image.
    ///
    /// A rejected file only sets the error; the previous image and result stay.
    pub fn process_file(&mut self, file: IncomingFile) -> Result<(), SessionError> {
        let mime_type = match self.validate(&file) {
            Ok(mime_type) => mime_type,
            Err(rejection) => {
                tracing::debug!(
                    file_name = %file.file_name,
                    size = file.data.len(),
                    "Upload failed validation"
                );
                return Err(self.reject(rejection));
            }
        };

        self.reset_state();
        self.image = Some(UploadedImage::new(file.file_name, mime_type, &file.data));
        Ok(())
    }

    /// Record an upload the HTTP layer refused before the whole file was read.
    ///
    /// Same outcome as an oversized file reaching `process_file`.
    pub fn reject_oversized_upload(&mut self) -> SessionError {
        self.reject(UploadRejection::TooLarge {
            limit: self.max_upload_bytes,
        })
    }

    fn reject(&mut self, rejection: UploadRejection) -> SessionError {
        self.error = Some(rejection.to_string());
        SessionError::Rejected(rejection)
    }

    fn validate(&self, file: &IncomingFile) -> Result<ImageMimeType, UploadRejection> {
        let mime_type: ImageMimeType = file
            .content_type
            .parse()
            .map_err(UploadRejection::UnsupportedType)?;

        if file.data.is_empty() {
            return Err(UploadRejection::Empty);
        }

        if file.data.len() > self.max_upload_bytes {
            return Err(UploadRejection::TooLarge {
                limit: self.max_upload_bytes,
            });
        }

        Ok(mime_type)
    }

    /// Enter the loading state and hand out what the remote call needs.
    pub fn begin_analysis(&mut self) -> Result<AnalysisTicket, SessionError> {
        let image = self.image.as_ref().ok_or(SessionError::NoImage)?;
        if self.is_loading {
            return Err(SessionError::AnalysisInProgress);
        }

        let ticket = AnalysisTicket {
            image_base64: image.base64_payload().to_string(),
            mime_type: image.mime_type,
            generation: self.generation,
        };

        self.is_loading = true;
        self.error = None;
        self.full_analysis = None;

        Ok(ticket)
    }

    /// Apply the outcome of an analysis started with `ticket`.
    ///
    /// Returns false when the ticket is stale (the image was removed or
    /// replaced in the meantime) and nothing was changed.
    pub fn complete_analysis<E: fmt::Display>(
        &mut self,
        ticket: &AnalysisTicket,
        outcome: Result<FullAnalysis, E>,
    ) -> bool {
        if ticket.generation != self.generation || !self.is_loading {
            tracing::debug!(
                ticket_generation = ticket.generation,
                current_generation = self.generation,
                "Discarding stale analysis result"
            );
            return false;
        }

        match outcome {
            Ok(analysis) => {
                self.full_analysis = Some(analysis);
                self.error = None;
            }
            Err(e) => {
                tracing::error!(error = %e, "An error occurred during analysis");
                self.full_analysis = None;
                self.error = Some(ANALYSIS_FAILED_MESSAGE.to_string());
            }
        }
        self.is_loading = false;
        true
    }

    pub fn remove_image(&mut self) {
        self.reset_state();
    }

    fn reset_state(&mut self) {
        self.image = None;
        self.full_analysis = None;
        self.is_loading = false;
        self.error = None;
        self.generation = self.generation.wrapping_add(1);
    }

    pub fn view(&self, session_id: Uuid, created_at: DateTime<Utc>) -> SessionView {
        SessionView {
            session_id,
            uploaded_image: self.image.as_ref().map(|i| i.data_url.clone()),
            uploaded_image_type: self.image.as_ref().map(|i| i.mime_type),
            uploaded_file_name: self.image.as_ref().map(|i| i.file_name.clone()),
            full_analysis: self.full_analysis.clone(),
            is_loading: self.is_loading,
            error: self.error.clone(),
            drag_over: self.drag_over,
            created_at,
        }
    }
}

/// Snapshot of a session as returned to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub session_id: Uuid,
    pub uploaded_image: Option<String>,
    pub uploaded_image_type: Option<ImageMimeType>,
    pub uploaded_file_name: Option<String>,
    pub full_analysis: Option<FullAnalysis>,
    pub is_loading: bool,
    pub error: Option<String>,
    pub drag_over: bool,
    pub created_at: DateTime<Utc>,
}
