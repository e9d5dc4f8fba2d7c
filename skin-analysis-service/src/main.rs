use service_core::observability::init_tracing;
use skin_analysis_service::config::AnalysisConfig;
use skin_analysis_service::services::metrics::init_metrics;
use skin_analysis_service::startup::Application;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Initialize metrics registry (must be before any metrics are recorded)
    init_metrics();

    let config = AnalysisConfig::load();

    // Tracing needs the log settings, so fall back to defaults if config failed
    let (log_level, otlp_endpoint) = match &config {
        Ok(c) => (
            c.observability.log_level.clone(),
            c.observability.otlp_endpoint.clone(),
        ),
        Err(_) => ("info".to_string(), None),
    };
    init_tracing(
        "skin-analysis-service",
        &log_level,
        otlp_endpoint.as_deref(),
    );

    let config = config.map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        std::io::Error::other(format!("Configuration error: {}", e))
    })?;

    if config.has_placeholder_api_key() {
        tracing::warn!(
            "GOOGLE_API_KEY is not set or still the placeholder; analysis requests will fail"
        );
    }

    let app = Application::build(config).await.map_err(|e| {
        tracing::error!("Failed to build application: {}", e);
        std::io::Error::other(format!("Startup error: {}", e))
    })?;

    app.run_until_stopped().await
}
