//! Uploaded image representation.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The only image types accepted for analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageMimeType {
    #[serde(rename = "image/png")]
    Png,
    #[serde(rename = "image/jpeg")]
    Jpeg,
}

impl ImageMimeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageMimeType::Png => "image/png",
            ImageMimeType::Jpeg => "image/jpeg",
        }
    }
}

impl fmt::Display for ImageMimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageMimeType {
    type Err = String;

    /// Accepts `image/png` and `image/jpeg`, ignoring case and parameters.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let essence = s.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        match essence.as_str() {
            "image/png" => Ok(ImageMimeType::Png),
            "image/jpeg" => Ok(ImageMimeType::Jpeg),
            _ => Err(s.to_string()),
        }
    }
}

/// Where a file came from in the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadSource {
    #[default]
    Picker,
    Drop,
}

impl FromStr for UploadSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "picker" => Ok(UploadSource::Picker),
            "drop" => Ok(UploadSource::Drop),
            other => Err(other.to_string()),
        }
    }
}

/// A file as received from the client, before validation.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub file_name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// A validated upload, stored as a data URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedImage {
    pub file_name: String,
    pub mime_type: ImageMimeType,
    pub data_url: String,
}

impl UploadedImage {
    pub fn new(file_name: impl Into<String>, mime_type: ImageMimeType, data: &[u8]) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type,
            data_url: format!("data:{};base64,{}", mime_type, BASE64.encode(data)),
        }
    }

    /// The base64 payload after the data URL's comma.
    pub fn base64_payload(&self) -> &str {
        self.data_url
            .split_once(',')
            .map(|(_, payload)| payload)
            .unwrap_or_default()
    }
}
