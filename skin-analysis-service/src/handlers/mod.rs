//! HTTP handlers for the skin analysis service.

pub mod analyses;
pub mod health;
pub mod metrics;
pub mod sessions;
pub mod upload;
