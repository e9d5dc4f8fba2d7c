//! Domain models for the skin analysis service.

pub mod analysis;
pub mod upload;

pub use analysis::{AnalysisResult, FullAnalysis, TreatmentStep};
pub use upload::{ImageMimeType, IncomingFile, UploadSource, UploadedImage};
