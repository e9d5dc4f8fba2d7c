//! Mock provider implementations for testing.

use super::{
    FinishReason, GeneratedImage, ImageParams, ImageProvider, InlineImage, ProviderError,
    ProviderResponse, VisionProvider,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Canned diagnosis with a three-step plan.
pub const SAMPLE_DIAGNOSIS_JSON: &str = r#"{
  "condition": "Atopic dermatitis",
  "description": "A chronic condition causing dry, itchy and inflamed skin.",
  "treatmentPlan": [
    {"step": 1, "description": "Moisturize twice daily with a fragrance-free emollient", "duration": "Ongoing"},
    {"step": 2, "description": "Apply a low-potency topical corticosteroid to flare areas", "duration": "7-10 days"},
    {"step": 3, "description": "Identify and avoid triggers such as harsh soaps", "duration": "2-4 weeks"}
  ]
}"#;

/// Mock vision provider returning a fixed text body.
pub struct MockVisionProvider {
    enabled: bool,
    response_text: String,
    calls: AtomicUsize,
    last_mime_type: Mutex<Option<String>>,
}

impl MockVisionProvider {
    pub fn new(enabled: bool) -> Self {
        Self::with_response(enabled, SAMPLE_DIAGNOSIS_JSON)
    }

    pub fn with_response(enabled: bool, response_text: impl Into<String>) -> Self {
        Self {
            enabled,
            response_text: response_text.into(),
            calls: AtomicUsize::new(0),
            last_mime_type: Mutex::new(None),
        }
    }

    /// Number of `generate_structured` calls received.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// MIME type of the most recent image received.
    pub fn last_mime_type(&self) -> Option<String> {
        self.last_mime_type
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
    }
}

#[async_trait]
impl VisionProvider for MockVisionProvider {
    fn model(&self) -> &str {
        "mock-vision"
    }

    async fn generate_structured(
        &self,
        prompt: &str,
        image: &InlineImage,
        _schema: &serde_json::Value,
    ) -> Result<ProviderResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut guard) = self.last_mime_type.lock() {
            *guard = Some(image.mime_type.clone());
        }

        if !self.enabled {
            return Err(ProviderError::NotConfigured(
                "Mock vision provider not enabled".to_string(),
            ));
        }

        Ok(ProviderResponse {
            text: Some(self.response_text.clone()),
            input_tokens: prompt.len() as i32 / 4,
            output_tokens: self.response_text.len() as i32 / 4,
            finish_reason: FinishReason::Complete,
        })
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        if self.enabled {
            Ok(())
        } else {
            Err(ProviderError::NotConfigured(
                "Mock vision provider not enabled".to_string(),
            ))
        }
    }
}

/// Mock image provider.
///
/// Each image encodes the prompt it was generated for, so callers can check
/// ordering. Latency can be made to shrink with each call so that later
/// requests finish first.
pub struct MockImageProvider {
    enabled: bool,
    fail_when_prompt_contains: Option<String>,
    reverse_latency: bool,
    mime_type: Option<String>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockImageProvider {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            fail_when_prompt_contains: None,
            reverse_latency: false,
            mime_type: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Fail any request whose prompt contains `needle`.
    pub fn failing_on(mut self, needle: impl Into<String>) -> Self {
        self.fail_when_prompt_contains = Some(needle.into());
        self
    }

    /// Report `mime_type` instead of the requested output type.
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Make earlier requests slower than later ones.
    pub fn with_reverse_latency(mut self) -> Self {
        self.reverse_latency = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of requests observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// The base64 payload this mock returns for `prompt`.
    pub fn image_for(prompt: &str) -> String {
        BASE64.encode(prompt.as_bytes())
    }
}

#[async_trait]
impl ImageProvider for MockImageProvider {
    fn model(&self) -> &str {
        "mock-image"
    }

    async fn generate_image(
        &self,
        prompt: &str,
        params: &ImageParams,
    ) -> Result<GeneratedImage, ProviderError> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);

        if !self.enabled {
            return Err(ProviderError::NotConfigured(
                "Mock image provider not enabled".to_string(),
            ));
        }

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let delay_ms = if self.reverse_latency {
            60u64.saturating_sub(index as u64 * 15).max(5)
        } else {
            10
        };
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(needle) = &self.fail_when_prompt_contains {
            if prompt.contains(needle.as_str()) {
                return Err(ProviderError::ApiError(format!(
                    "Mock failure for prompt containing '{}'",
                    needle
                )));
            }
        }

        Ok(GeneratedImage {
            data_base64: Self::image_for(prompt),
            mime_type: self
                .mime_type
                .clone()
                .unwrap_or_else(|| params.output_mime_type.clone()),
        })
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        if self.enabled {
            Ok(())
        } else {
            Err(ProviderError::NotConfigured(
                "Mock image provider not enabled".to_string(),
            ))
        }
    }
}
