//! Diagnosis and healing-visual result shapes.
//!
//! Field names are camelCase on the wire: the same shape is requested from
//! the text model and returned to HTTP clients.

use serde::{Deserialize, Serialize};

/// One step of the treatment plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreatmentStep {
    pub step: i64,
    pub description: String,
    /// Free text such as "7-10 days".
    pub duration: String,
}

/// Structured diagnosis returned by the text model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub condition: String,
    pub description: String,
    pub treatment_plan: Vec<TreatmentStep>,
}

/// Diagnosis plus one healing image per treatment step, in step order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullAnalysis {
    pub diagnosis: AnalysisResult,
    /// Base64-encoded image payloads.
    pub healing_images: Vec<String>,
    /// MIME type the image model reported for each entry of `healing_images`.
    #[serde(default)]
    pub healing_image_types: Vec<String>,
}

/// Used when a stored analysis predates per-image types.
pub const DEFAULT_HEALING_IMAGE_TYPE: &str = "image/jpeg";

impl FullAnalysis {
    /// Base64 payload and MIME type of the healing image at `index`.
    pub fn healing_image(&self, index: usize) -> Option<(&str, &str)> {
        let data = self.healing_images.get(index)?;
        let mime_type = self
            .healing_image_types
            .get(index)
            .map(String::as_str)
            .unwrap_or(DEFAULT_HEALING_IMAGE_TYPE);
        Some((data, mime_type))
    }

    /// Healing image for a treatment step, paired with its step.
    pub fn healing_stages(&self) -> impl Iterator<Item = (&TreatmentStep, &str)> {
        self.diagnosis
            .treatment_plan
            .iter()
            .zip(self.healing_images.iter().map(String::as_str))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnosis_parses_from_model_json() {
        let raw = r#"{
            "condition": "Contact dermatitis",
            "description": "Inflammation caused by an irritant.",
            "treatmentPlan": [
                {"step": 1, "description": "Avoid the irritant", "duration": "Ongoing"},
                {"step": 2, "description": "Apply hydrocortisone cream", "duration": "7-10 days"}
            ]
        }"#;

        let parsed: AnalysisResult = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.condition, "Contact dermatitis");
        assert_eq!(parsed.treatment_plan.len(), 2);
        assert_eq!(parsed.treatment_plan[1].duration, "7-10 days");
    }

    #[test]
    fn diagnosis_without_treatment_plan_is_rejected() {
        let raw = r#"{"condition": "Acne", "description": "Clogged pores."}"#;
        assert!(serde_json::from_str::<AnalysisResult>(raw).is_err());
    }

    #[test]
    fn full_analysis_serializes_in_camel_case() {
        let analysis = FullAnalysis {
            diagnosis: AnalysisResult {
                condition: "Eczema".to_string(),
                description: "Dry, itchy skin.".to_string(),
                treatment_plan: vec![],
            },
            healing_images: vec![],
            healing_image_types: vec![],
        };

        let value = serde_json::to_value(&analysis).unwrap();
        assert!(value.get("healingImages").is_some());
        assert!(value["diagnosis"].get("treatmentPlan").is_some());
    }

    #[test]
    fn healing_stages_pair_steps_with_images() {
        let analysis = FullAnalysis {
            diagnosis: AnalysisResult {
                condition: "Eczema".to_string(),
                description: "Dry, itchy skin.".to_string(),
                treatment_plan: vec![
                    TreatmentStep {
                        step: 1,
                        description: "Moisturize".to_string(),
                        duration: "Daily".to_string(),
                    },
                    TreatmentStep {
                        step: 2,
                        description: "Topical steroid".to_string(),
                        duration: "2 weeks".to_string(),
                    },
                ],
            },
            healing_images: vec!["aaa".to_string(), "bbb".to_string()],
            healing_image_types: vec!["image/png".to_string()],
        };

        let stages: Vec<_> = analysis
            .healing_stages()
            .map(|(step, image)| (step.step, image))
            .collect();
        assert_eq!(stages, vec![(1, "aaa"), (2, "bbb")]);

        assert_eq!(analysis.healing_image(0), Some(("aaa", "image/png")));
        assert_eq!(
            analysis.healing_image(1),
            Some(("bbb", DEFAULT_HEALING_IMAGE_TYPE))
        );
        assert_eq!(analysis.healing_image(2), None);
    }
}
