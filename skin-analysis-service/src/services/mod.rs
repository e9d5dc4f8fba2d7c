pub mod analysis;
pub mod metrics;
pub mod providers;

pub use analysis::{AnalysisError, AnalysisService};
