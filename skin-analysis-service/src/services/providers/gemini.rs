//! Gemini AI provider implementations.
//!
//! Structured diagnosis goes through `generateContent` on a Gemini model;
//! healing visuals go through `predict` on an Imagen model. Both talk to the
//! Generative Language REST API with the key in the `x-goog-api-key` header.

use super::{
    FinishReason, GeneratedImage, ImageParams, ImageProvider, InlineImage, ProviderError,
    ProviderResponse, VisionProvider,
};
use async_trait::async_trait;
use reqwest::{Client, Response};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Gemini provider configuration.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: Secret<String>,
    /// API root, e.g. `https://generativelanguage.googleapis.com/v1beta`.
    pub api_base: String,
    pub model: String,
    pub timeout: Duration,
}

impl GeminiConfig {
    /// Build the API URL for the configured model and method.
    fn api_url(&self, method: &str) -> String {
        format!("{}/models/{}:{}", self.api_base, self.model, method)
    }
}

fn build_client(timeout: Duration) -> Result<Client, ProviderError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ProviderError::NotConfigured(format!("Failed to create HTTP client: {}", e)))
}

/// Map non-success statuses to provider errors.
async fn check_status(response: Response) -> Result<Response, ProviderError> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let error_text = response.text().await.unwrap_or_default();

    if status.as_u16() == 429 {
        return Err(ProviderError::RateLimited);
    }

    if status.as_u16() == 400 {
        return Err(ProviderError::InvalidRequest(format!(
            "Gemini API rejected request: {}",
            error_text
        )));
    }

    Err(ProviderError::ApiError(format!(
        "Gemini API error {}: {}",
        status, error_text
    )))
}

async fn list_models(client: &Client, config: &GeminiConfig) -> Result<(), ProviderError> {
    if config.api_key.expose_secret().is_empty() {
        return Err(ProviderError::NotConfigured(
            "Gemini API key not configured".to_string(),
        ));
    }

    let url = format!("{}/models", config.api_base);
    let response = client
        .get(&url)
        .header(API_KEY_HEADER, config.api_key.expose_secret())
        .send()
        .await
        .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

    if response.status().is_success() {
        Ok(())
    } else {
        Err(ProviderError::ApiError(format!(
            "Health check failed: {}",
            response.status()
        )))
    }
}

/// Gemini multimodal provider with JSON-schema constrained output.
pub struct GeminiVisionProvider {
    config: GeminiConfig,
    client: Client,
}

impl GeminiVisionProvider {
    pub fn new(config: GeminiConfig) -> Result<Self, ProviderError> {
        let client = build_client(config.timeout)?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl VisionProvider for GeminiVisionProvider {
    fn model(&self) -> &str {
        &self.config.model
    }

    async fn generate_structured(
        &self,
        prompt: &str,
        image: &InlineImage,
        schema: &serde_json::Value,
    ) -> Result<ProviderResponse, ProviderError> {
        if image.data_base64.is_empty() {
            return Err(ProviderError::InvalidRequest(
                "Image payload is empty".to_string(),
            ));
        }

        let request = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![
                    ContentPart::Text {
                        text: prompt.to_string(),
                    },
                    ContentPart::InlineData {
                        inline_data: InlineData {
                            mime_type: image.mime_type.clone(),
                            data: image.data_base64.clone(),
                        },
                    },
                ],
            }],
            generation_config: Some(GenerationConfig {
                response_mime_type: Some("application/json".to_string()),
                response_schema: Some(schema.clone()),
            }),
        };

        let url = self.config.api_url("generateContent");

        tracing::debug!(
            model = %self.config.model,
            prompt_len = prompt.len(),
            image_len = image.data_base64.len(),
            mime_type = %image.mime_type,
            "Sending structured request to Gemini API"
        );

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, self.config.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        let api_response: GenerateContentResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::ApiError(format!("Failed to parse response: {}", e)))?;

        if let Some(reason) = api_response
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
        {
            tracing::warn!(block_reason = %reason, "Gemini blocked the prompt");
            return Err(ProviderError::ContentFiltered);
        }

        let candidate = api_response.candidates.first();

        // Concatenate every text part of the first candidate
        let text = candidate.and_then(|c| c.content.as_ref()).and_then(|content| {
            let joined: String = content
                .parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect();
            (!joined.is_empty()).then_some(joined)
        });

        let usage = api_response.usage_metadata.unwrap_or_default();

        let finish_reason = candidate
            .map(|c| match c.finish_reason.as_deref() {
                Some("STOP") => FinishReason::Complete,
                Some("MAX_TOKENS") => FinishReason::Length,
                Some("SAFETY") | Some("PROHIBITED_CONTENT") | Some("BLOCKLIST") => {
                    FinishReason::ContentFilter
                }
                _ => FinishReason::Complete,
            })
            .unwrap_or(FinishReason::Error);

        if finish_reason == FinishReason::ContentFilter {
            return Err(ProviderError::ContentFiltered);
        }

        Ok(ProviderResponse {
            text,
            input_tokens: usage.prompt_token_count.unwrap_or(0),
            output_tokens: usage.candidates_token_count.unwrap_or(0),
            finish_reason,
        })
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        list_models(&self.client, &self.config).await
    }
}

/// Imagen text-to-image provider.
pub struct GeminiImageProvider {
    config: GeminiConfig,
    client: Client,
}

impl GeminiImageProvider {
    pub fn new(config: GeminiConfig) -> Result<Self, ProviderError> {
        let client = build_client(config.timeout)?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl ImageProvider for GeminiImageProvider {
    fn model(&self) -> &str {
        &self.config.model
    }

    async fn generate_image(
        &self,
        prompt: &str,
        params: &ImageParams,
    ) -> Result<GeneratedImage, ProviderError> {
        let request = PredictRequest {
            instances: vec![PredictInstance {
                prompt: prompt.to_string(),
            }],
            parameters: PredictParameters {
                sample_count: params.number_of_images,
                aspect_ratio: params.aspect_ratio.clone(),
                output_options: OutputOptions {
                    mime_type: params.output_mime_type.clone(),
                },
            },
        };

        let url = self.config.api_url("predict");

        tracing::debug!(
            model = %self.config.model,
            prompt_len = prompt.len(),
            aspect_ratio = %params.aspect_ratio,
            "Sending image request to Imagen API"
        );

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, self.config.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        let api_response: PredictResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::ApiError(format!("Failed to parse response: {}", e)))?;

        // Imagen drops filtered samples instead of failing the request
        let prediction = api_response
            .predictions
            .into_iter()
            .find(|p| p.bytes_base64_encoded.is_some())
            .ok_or(ProviderError::ContentFiltered)?;

        Ok(GeneratedImage {
            data_base64: prediction.bytes_base64_encoded.unwrap_or_default(),
            mime_type: prediction
                .mime_type
                .unwrap_or_else(|| params.output_mime_type.clone()),
        })
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        list_models(&self.client, &self.config).await
    }
}

// ============================================================================
// Gemini API Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<ContentPart>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum ContentPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    Other(serde_json::Value),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<i32>,
    candidates_token_count: Option<i32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PredictRequest {
    instances: Vec<PredictInstance>,
    parameters: PredictParameters,
}

#[derive(Debug, Serialize)]
struct PredictInstance {
    prompt: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PredictParameters {
    sample_count: u32,
    aspect_ratio: String,
    output_options: OutputOptions,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OutputOptions {
    mime_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    #[serde(default)]
    bytes_base64_encoded: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
}
