//! Prometheus metrics for skin-analysis-service.
//!
//! Provides HTTP and AI-specific metrics for observability.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};
use std::sync::{Once, OnceLock};

// Global registry
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

// HTTP metrics
pub static HTTP_REQUESTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static HTTP_REQUEST_DURATION_SECONDS: OnceLock<HistogramVec> = OnceLock::new();

// Analysis metrics
pub static ANALYSES_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static ANALYSES_IN_FLIGHT: OnceLock<IntGaugeVec> = OnceLock::new();
pub static HEALING_IMAGES_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static GENAI_TOKENS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

// Provider metrics
pub static PROVIDER_LATENCY_SECONDS: OnceLock<HistogramVec> = OnceLock::new();
pub static PROVIDER_ERRORS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

// Session metrics
pub static ACTIVE_SESSIONS: OnceLock<IntGaugeVec> = OnceLock::new();

static INIT: Once = Once::new();

/// Initialize all metrics. Safe to call more than once; only the first call registers.
pub fn init_metrics() {
    INIT.call_once(register_metrics);
}

fn register_metrics() {
    let registry = Registry::new();

    let http_requests_total = IntCounterVec::new(
        Opts::new("http_requests_total", "Total number of HTTP requests"),
        &["method", "path", "status"],
    )
    .expect("Failed to create http_requests_total metric");

    let http_request_duration = HistogramVec::new(
        HistogramOpts::new(
            "http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        &["method", "path"],
    )
    .expect("Failed to create http_request_duration_seconds metric");

    // Analyses by outcome: success, diagnosis_failed, images_failed
    let analyses_total = IntCounterVec::new(
        Opts::new("analyses_total", "Total skin analyses"),
        &["outcome"],
    )
    .expect("Failed to create analyses_total metric");

    let analyses_in_flight = IntGaugeVec::new(
        Opts::new(
            "analyses_in_flight",
            "Number of analyses currently being processed",
        ),
        &["kind"],
    )
    .expect("Failed to create analyses_in_flight metric");

    let healing_images = IntCounterVec::new(
        Opts::new("healing_images_total", "Total healing images generated"),
        &["model"],
    )
    .expect("Failed to create healing_images_total metric");

    let genai_tokens = IntCounterVec::new(
        Opts::new("genai_tokens_total", "Total tokens processed"),
        &["model", "type"], // type: input, output
    )
    .expect("Failed to create genai_tokens_total metric");

    let provider_latency = HistogramVec::new(
        HistogramOpts::new(
            "genai_provider_latency_seconds",
            "AI provider API latency in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0]),
        &["provider", "model"],
    )
    .expect("Failed to create genai_provider_latency_seconds metric");

    let provider_errors = IntCounterVec::new(
        Opts::new("genai_provider_errors_total", "Total AI provider errors"),
        &["provider", "error_type"],
    )
    .expect("Failed to create genai_provider_errors_total metric");

    let active_sessions = IntGaugeVec::new(
        Opts::new("analysis_sessions_active", "Number of live analysis sessions"),
        &["service"],
    )
    .expect("Failed to create analysis_sessions_active metric");

    registry
        .register(Box::new(http_requests_total.clone()))
        .expect("Failed to register http_requests_total");
    registry
        .register(Box::new(http_request_duration.clone()))
        .expect("Failed to register http_request_duration_seconds");
    registry
        .register(Box::new(analyses_total.clone()))
        .expect("Failed to register analyses_total");
    registry
        .register(Box::new(analyses_in_flight.clone()))
        .expect("Failed to register analyses_in_flight");
    registry
        .register(Box::new(healing_images.clone()))
        .expect("Failed to register healing_images_total");
    registry
        .register(Box::new(genai_tokens.clone()))
        .expect("Failed to register genai_tokens_total");
    registry
        .register(Box::new(provider_latency.clone()))
        .expect("Failed to register genai_provider_latency_seconds");
    registry
        .register(Box::new(provider_errors.clone()))
        .expect("Failed to register genai_provider_errors_total");
    registry
        .register(Box::new(active_sessions.clone()))
        .expect("Failed to register analysis_sessions_active");

    // Initialize globals
    let _ = REGISTRY.set(registry);
    let _ = HTTP_REQUESTS_TOTAL.set(http_requests_total);
    let _ = HTTP_REQUEST_DURATION_SECONDS.set(http_request_duration);
    let _ = ANALYSES_TOTAL.set(analyses_total);
    let _ = ANALYSES_IN_FLIGHT.set(analyses_in_flight);
    let _ = HEALING_IMAGES_TOTAL.set(healing_images);
    let _ = GENAI_TOKENS_TOTAL.set(genai_tokens);
    let _ = PROVIDER_LATENCY_SECONDS.set(provider_latency);
    let _ = PROVIDER_ERRORS_TOTAL.set(provider_errors);
    let _ = ACTIVE_SESSIONS.set(active_sessions);

    tracing::info!("Prometheus metrics initialized");
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();

    let registry = match REGISTRY.get() {
        Some(r) => r,
        None => {
            tracing::error!("Metrics registry not initialized");
            return "# Metrics registry not initialized\n".to_string();
        }
    };

    let metric_families = registry.gather();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return format!("# Failed to encode metrics: {}\n", e);
    }

    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Failed to convert metrics to UTF-8");
            format!("# Failed to convert metrics to UTF-8: {}\n", e)
        }
    }
}

// Helper functions for recording metrics

/// Record a completed HTTP request.
pub fn record_http_request(method: &str, path: &str, status: &str, duration_secs: f64) {
    if let Some(counter) = HTTP_REQUESTS_TOTAL.get() {
        counter.with_label_values(&[method, path, status]).inc();
    }
    if let Some(histogram) = HTTP_REQUEST_DURATION_SECONDS.get() {
        histogram
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }
}

/// Record the outcome of a full analysis.
pub fn record_analysis(outcome: &str) {
    if let Some(counter) = ANALYSES_TOTAL.get() {
        counter.with_label_values(&[outcome]).inc();
    }
}

/// Increment analyses in flight.
pub fn inc_analyses_in_flight(kind: &str) {
    if let Some(gauge) = ANALYSES_IN_FLIGHT.get() {
        gauge.with_label_values(&[kind]).inc();
    }
}

/// Decrement analyses in flight.
pub fn dec_analyses_in_flight(kind: &str) {
    if let Some(gauge) = ANALYSES_IN_FLIGHT.get() {
        gauge.with_label_values(&[kind]).dec();
    }
}

/// Holds one analysis in the in-flight gauge until dropped, including when
/// the owning future is cancelled.
pub struct InFlightGuard {
    kind: &'static str,
}

impl InFlightGuard {
    pub fn new(kind: &'static str) -> Self {
        inc_analyses_in_flight(kind);
        Self { kind }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        dec_analyses_in_flight(self.kind);
    }
}

/// Record generated healing images.
pub fn record_healing_images(model: &str, count: usize) {
    if let Some(counter) = HEALING_IMAGES_TOTAL.get() {
        counter.with_label_values(&[model]).inc_by(count as u64);
    }
}

/// Record token usage of a diagnosis call.
pub fn record_tokens(model: &str, input_tokens: i32, output_tokens: i32) {
    if let Some(counter) = GENAI_TOKENS_TOTAL.get() {
        counter
            .with_label_values(&[model, "input"])
            .inc_by(input_tokens.max(0) as u64);
        counter
            .with_label_values(&[model, "output"])
            .inc_by(output_tokens.max(0) as u64);
    }
}

/// Record provider latency.
pub fn record_provider_latency(provider: &str, model: &str, duration_secs: f64) {
    if let Some(histogram) = PROVIDER_LATENCY_SECONDS.get() {
        histogram
            .with_label_values(&[provider, model])
            .observe(duration_secs);
    }
}

/// Record a provider error.
pub fn record_provider_error(provider: &str, error_type: &str) {
    if let Some(counter) = PROVIDER_ERRORS_TOTAL.get() {
        counter.with_label_values(&[provider, error_type]).inc();
    }
}

/// Set the number of live sessions.
pub fn set_active_sessions(count: usize) {
    if let Some(gauge) = ACTIVE_SESSIONS.get() {
        gauge
            .with_label_values(&["skin-analysis-service"])
            .set(count as i64);
    }
}
