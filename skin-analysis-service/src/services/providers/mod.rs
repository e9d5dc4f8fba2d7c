//! AI provider abstractions and implementations.
//!
//! The analysis pipeline needs two remote capabilities: a multimodal model
//! that answers in a fixed JSON schema, and a text-to-image model. Each sits
//! behind a trait so the Gemini backends can be swapped for mocks.

pub mod gemini;
pub mod mock;

use async_trait::async_trait;
use thiserror::Error;

/// Error type for provider operations.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Content filtered")]
    ContentFiltered,

    #[error("Network error: {0}")]
    NetworkError(String),
}

impl ProviderError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::NotConfigured(_) => "not_configured",
            ProviderError::ApiError(_) => "api_error",
            ProviderError::InvalidRequest(_) => "invalid_request",
            ProviderError::RateLimited => "rate_limited",
            ProviderError::ContentFiltered => "content_filtered",
            ProviderError::NetworkError(_) => "network_error",
        }
    }
}

/// Image sent to the model as inline data.
#[derive(Debug, Clone)]
pub struct InlineImage {
    /// Base64 payload, without any data URL prefix.
    pub data_base64: String,
    pub mime_type: String,
}

/// Result of a structured generation call.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    /// Text content; JSON when a response schema was requested.
    pub text: Option<String>,

    /// Input tokens consumed.
    pub input_tokens: i32,

    /// Output tokens generated.
    pub output_tokens: i32,

    /// Finish reason.
    pub finish_reason: FinishReason,
}

/// Reason why generation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Complete,
    Length,
    ContentFilter,
    Error,
}

impl FinishReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinishReason::Complete => "complete",
            FinishReason::Length => "length",
            FinishReason::ContentFilter => "content_filter",
            FinishReason::Error => "error",
        }
    }
}

/// Parameters for a single image-generation request.
#[derive(Debug, Clone)]
pub struct ImageParams {
    pub number_of_images: u32,
    pub output_mime_type: String,
    pub aspect_ratio: String,
}

impl Default for ImageParams {
    fn default() -> Self {
        Self {
            number_of_images: 1,
            output_mime_type: "image/jpeg".to_string(),
            aspect_ratio: "1:1".to_string(),
        }
    }
}

/// A generated image as returned by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    /// Base64-encoded image bytes.
    pub data_base64: String,
    pub mime_type: String,
}

/// Trait for multimodal structured-output providers (e.g., Gemini).
#[async_trait]
pub trait VisionProvider: Send + Sync {
    /// Model identifier, for logs and metrics.
    fn model(&self) -> &str;

    /// Generate a response to `prompt` about `image`, constrained to `schema`.
    async fn generate_structured(
        &self,
        prompt: &str,
        image: &InlineImage,
        schema: &serde_json::Value,
    ) -> Result<ProviderResponse, ProviderError>;

    /// Health check.
    async fn health_check(&self) -> Result<(), ProviderError>;
}

/// Trait for text-to-image providers (e.g., Imagen).
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Model identifier, for logs and metrics.
    fn model(&self) -> &str;

    /// Generate one image for `prompt`.
    async fn generate_image(
        &self,
        prompt: &str,
        params: &ImageParams,
    ) -> Result<GeneratedImage, ProviderError>;

    /// Health check.
    async fn health_check(&self) -> Result<(), ProviderError>;
}
