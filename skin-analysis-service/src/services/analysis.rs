//! Diagnosis and healing-visual pipeline.
//!
//! One structured call to the vision model, then one image request per
//! treatment step. The image requests run concurrently and the whole
//! operation fails if any of them fails.

use crate::models::{AnalysisResult, FullAnalysis, ImageMimeType, TreatmentStep};
use crate::services::metrics;
use crate::services::providers::{
    GeneratedImage, ImageParams, ImageProvider, InlineImage, ProviderError, VisionProvider,
};
use futures::future::try_join_all;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

const DIAGNOSIS_PROMPT: &str = "You are a dermatology expert. Analyze this skin image. \
Identify the most likely condition, provide a brief description, and create a standard, \
step-by-step medical treatment plan. Provide a concise plan with 3-4 steps.

IMPORTANT: Respond ONLY with a JSON object that strictly adheres to the provided schema. \
Do not include any markdown formatting like ```json.";

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Diagnosis request failed: {0}")]
    Diagnosis(#[source] ProviderError),

    #[error("Diagnosis response was empty")]
    EmptyDiagnosis,

    #[error("Diagnosis response was not valid JSON: {0}")]
    MalformedDiagnosis(#[from] serde_json::Error),

    #[error("Healing image for step {step} failed: {source}")]
    HealingImage {
        step: i64,
        #[source]
        source: ProviderError,
    },
}

impl AnalysisError {
    /// Metrics label for the stage that failed.
    pub fn outcome(&self) -> &'static str {
        match self {
            AnalysisError::Diagnosis(_)
            | AnalysisError::EmptyDiagnosis
            | AnalysisError::MalformedDiagnosis(_) => "diagnosis_failed",
            AnalysisError::HealingImage { .. } => "images_failed",
        }
    }
}

/// Response schema the vision model must follow.
pub fn diagnosis_schema() -> serde_json::Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "condition": {
                "type": "STRING",
                "description": "The name of the diagnosed skin condition."
            },
            "description": {
                "type": "STRING",
                "description": "A brief, professional description of the condition."
            },
            "treatmentPlan": {
                "type": "ARRAY",
                "description": "A step-by-step treatment plan.",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "step": { "type": "INTEGER" },
                        "description": {
                            "type": "STRING",
                            "description": "Detailed action for this step of the treatment."
                        },
                        "duration": {
                            "type": "STRING",
                            "description": "Estimated duration for this step (e.g., \"7-10 days\")."
                        }
                    },
                    "required": ["step", "description", "duration"]
                }
            }
        },
        "required": ["condition", "description", "treatmentPlan"]
    })
}

/// Prompt for the healing image of one treatment step.
pub fn healing_prompt(condition: &str, step: &TreatmentStep) -> String {
    format!(
        "A photorealistic image of skin with '{}', that is in the process of healing after \
         following the treatment: \"{}\". The skin should show visible improvement appropriate \
         for this stage.",
        condition, step.description
    )
}

/// Runs the two-phase analysis against the configured providers.
pub struct AnalysisService {
    vision: Arc<dyn VisionProvider>,
    images: Arc<dyn ImageProvider>,
    image_params: ImageParams,
}

impl AnalysisService {
    pub fn new(vision: Arc<dyn VisionProvider>, images: Arc<dyn ImageProvider>) -> Self {
        Self {
            vision,
            images,
            image_params: ImageParams::default(),
        }
    }

    pub fn vision_provider(&self) -> &Arc<dyn VisionProvider> {
        &self.vision
    }

    pub fn image_provider(&self) -> &Arc<dyn ImageProvider> {
        &self.images
    }

    /// Diagnose the image, then render one healing image per treatment step.
    ///
    /// `image_base64` is the raw base64 payload, without a data URL prefix.
    #[tracing::instrument(skip(self, image_base64, mime_type), fields(image_len = image_base64.len(), mime_type = %mime_type))]
    pub async fn get_analysis_and_healing_visuals(
        &self,
        image_base64: &str,
        mime_type: ImageMimeType,
    ) -> Result<FullAnalysis, AnalysisError> {
        let in_flight = metrics::InFlightGuard::new("full");
        let result = self.run(image_base64, mime_type).await;
        drop(in_flight);

        match &result {
            Ok(analysis) => {
                metrics::record_analysis("success");
                tracing::info!(
                    condition = %analysis.diagnosis.condition,
                    steps = analysis.diagnosis.treatment_plan.len(),
                    "Analysis completed"
                );
            }
            Err(e) => {
                metrics::record_analysis(e.outcome());
                tracing::error!(error = %e, "Analysis failed");
            }
        }

        result
    }

    async fn run(
        &self,
        image_base64: &str,
        mime_type: ImageMimeType,
    ) -> Result<FullAnalysis, AnalysisError> {
        let diagnosis = self.get_diagnosis(image_base64, mime_type).await?;
        let (healing_images, healing_image_types): (Vec<String>, Vec<String>) = self
            .generate_healing_images(&diagnosis)
            .await?
            .into_iter()
            .map(|image| (image.data_base64, image.mime_type))
            .unzip();
        Ok(FullAnalysis {
            diagnosis,
            healing_images,
            healing_image_types,
        })
    }

    async fn get_diagnosis(
        &self,
        image_base64: &str,
        mime_type: ImageMimeType,
    ) -> Result<AnalysisResult, AnalysisError> {
        let image = InlineImage {
            data_base64: image_base64.to_string(),
            mime_type: mime_type.as_str().to_string(),
        };

        let start = Instant::now();
        let response = self
            .vision
            .generate_structured(DIAGNOSIS_PROMPT, &image, &diagnosis_schema())
            .await;
        metrics::record_provider_latency(
            "vision",
            self.vision.model(),
            start.elapsed().as_secs_f64(),
        );

        let response = response.map_err(|e| {
            metrics::record_provider_error("vision", e.kind());
            AnalysisError::Diagnosis(e)
        })?;

        metrics::record_tokens(
            self.vision.model(),
            response.input_tokens,
            response.output_tokens,
        );

        tracing::debug!(
            finish_reason = response.finish_reason.as_str(),
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            "Diagnosis received"
        );

        let text = response.text.ok_or(AnalysisError::EmptyDiagnosis)?;
        let text = text.trim();
        if text.is_empty() {
            return Err(AnalysisError::EmptyDiagnosis);
        }

        Ok(serde_json::from_str(text)?)
    }

    async fn generate_healing_images(
        &self,
        diagnosis: &AnalysisResult,
    ) -> Result<Vec<GeneratedImage>, AnalysisError> {
        let requests = diagnosis.treatment_plan.iter().map(|step| {
            let prompt = healing_prompt(&diagnosis.condition, step);
            async move {
                let start = Instant::now();
                let result = self.images.generate_image(&prompt, &self.image_params).await;
                metrics::record_provider_latency(
                    "image",
                    self.images.model(),
                    start.elapsed().as_secs_f64(),
                );

                result.map_err(|e| {
                    metrics::record_provider_error("image", e.kind());
                    AnalysisError::HealingImage {
                        step: step.step,
                        source: e,
                    }
                })
            }
        });

        // try_join_all keeps input order and bails on the first error
        let images = try_join_all(requests).await?;
        metrics::record_healing_images(self.images.model(), images.len());
        Ok(images)
    }
}
