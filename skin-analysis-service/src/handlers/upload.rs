use crate::models::{IncomingFile, UploadSource};
use axum::extract::multipart::{Multipart, MultipartError};
use axum::http::StatusCode;
use service_core::error::AppError;

/// Form field carrying the image.
pub const FILE_FIELD: &str = "file";

/// Optional form field naming how the file was chosen.
pub const SOURCE_FIELD: &str = "source";

#[derive(Debug)]
pub struct UploadForm {
    pub file: Option<IncomingFile>,
    pub source: UploadSource,
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(e.body_text())
    } else {
        AppError::BadRequest(anyhow::anyhow!("Failed to read multipart field: {}", e))
    }
}

/// Read the upload form. Unknown fields are skipped; a missing file is
/// reported as `None` so callers can treat it as a no-op.
pub async fn read_upload_form(mut multipart: Multipart) -> Result<UploadForm, AppError> {
    let mut file = None;
    let mut source = UploadSource::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some(FILE_FIELD) => {
                let file_name = field.file_name().unwrap_or("unnamed").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field.bytes().await.map_err(multipart_error)?.to_vec();

                tracing::debug!(
                    file_name = %file_name,
                    content_type = %content_type,
                    size = data.len(),
                    "Received upload"
                );

                file = Some(IncomingFile {
                    file_name,
                    content_type,
                    data,
                });
            }
            Some(SOURCE_FIELD) => {
                let value = field.text().await.map_err(multipart_error)?;
                source = value.parse().map_err(|other: String| {
                    AppError::BadRequest(anyhow::anyhow!("Unknown upload source '{}'", other))
                })?;
            }
            other => {
                tracing::debug!(field = ?other, "Ignoring unknown multipart field");
            }
        }
    }

    Ok(UploadForm { file, source })
}
