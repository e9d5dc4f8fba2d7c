use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::time::Duration;

/// Google Generative Language API base URL.
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Value shipped in sample configuration; warn loudly if it reaches runtime.
pub const PLACEHOLDER_API_KEY: &str = "YOUR_API_KEY_HERE";

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// 10MB is well above what a phone camera JPEG needs.
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

const DEFAULT_SESSION_IDLE_SECS: u64 = 3600;

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub models: ModelConfig,
    pub google: GoogleConfig,
    pub limits: LimitsConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Multimodal model producing the structured diagnosis (e.g., gemini-2.5-flash)
    pub text_model: String,
    /// Text-to-image model for healing visuals (e.g., imagen-4.0-generate-001)
    pub image_model: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoogleConfig {
    pub api_key: Secret<String>,
    pub api_base: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    pub max_upload_bytes: usize,
    pub session_idle_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
}

impl AnalysisConfig {
    pub fn load() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;
        let is_prod = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string()) == "prod";

        Ok(AnalysisConfig {
            common: common_config,
            models: ModelConfig {
                text_model: get_env("ANALYSIS_TEXT_MODEL", Some("gemini-2.5-flash"), is_prod)?,
                image_model: get_env(
                    "ANALYSIS_IMAGE_MODEL",
                    Some("imagen-4.0-generate-001"),
                    is_prod,
                )?,
            },
            google: GoogleConfig {
                api_key: Secret::new(get_env(
                    "GOOGLE_API_KEY",
                    Some(PLACEHOLDER_API_KEY),
                    is_prod,
                )?),
                api_base: get_env("GOOGLE_API_BASE", Some(DEFAULT_API_BASE), is_prod)?
                    .trim_end_matches('/')
                    .to_string(),
                request_timeout_secs: get_env(
                    "ANALYSIS_REQUEST_TIMEOUT_SECS",
                    Some(&DEFAULT_REQUEST_TIMEOUT_SECS.to_string()),
                    is_prod,
                )?
                .parse()
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            },
            limits: LimitsConfig {
                max_upload_bytes: get_env(
                    "ANALYSIS_MAX_UPLOAD_BYTES",
                    Some(&DEFAULT_MAX_UPLOAD_BYTES.to_string()),
                    is_prod,
                )?
                .parse()
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
                session_idle_secs: get_env(
                    "ANALYSIS_SESSION_IDLE_SECS",
                    Some(&DEFAULT_SESSION_IDLE_SECS.to_string()),
                    is_prod,
                )?
                .parse()
                .unwrap_or(DEFAULT_SESSION_IDLE_SECS),
            },
            observability: ObservabilityConfig {
                log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
                otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            },
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.google.request_timeout_secs)
    }

    pub fn session_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.limits.session_idle_secs)
    }

    /// True when the credential is missing or still the sample placeholder.
    pub fn has_placeholder_api_key(&self) -> bool {
        let key = self.google.api_key.expose_secret();
        key.is_empty() || key == PLACEHOLDER_API_KEY
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}
