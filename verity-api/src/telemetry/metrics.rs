//! Prometheus Metrics Definitions
//!
//! Defines all Verity metrics with their labels and exposes the text
//! encoding for Prometheus scraping.

use axum::{http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, CounterVec, Encoder, Gauge,
    HistogramVec, TextEncoder,
};

use crate::error::{ApiError, ApiResult};

/// HTTP request latency buckets (seconds)
/// Covers: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s, 30s, 120s
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0, 30.0, 120.0,
];

/// Global metrics instance - initialized on first use
pub static METRICS: Lazy<ApiResult<VerityMetrics>> = Lazy::new(VerityMetrics::new);

/// The registered metrics, or `None` when registration failed.
pub fn metrics() -> Option<&'static VerityMetrics> {
    METRICS.as_ref().ok()
}

/// Container for all Verity metrics.
#[derive(Clone)]
pub struct VerityMetrics {
    /// HTTP request counter - labels: method, path, status
    pub http_requests_total: CounterVec,

    /// HTTP request duration histogram - labels: method, path
    pub http_request_duration_seconds: HistogramVec,

    /// Public lookups - labels: mode, outcome
    pub search_requests_total: CounterVec,

    /// Imported spreadsheet rows - labels: status
    pub import_rows_total: CounterVec,

    /// Search cache hit ratio (0-100), refreshed on each lookup
    pub cache_hit_ratio: Gauge,
}

impl VerityMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "verity_http_requests_total",
                "Total number of HTTP requests",
                &["method", "path", "status"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register http_requests_total: {}", e)))?,

            http_request_duration_seconds: register_histogram_vec!(
                "verity_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register http_request_duration_seconds: {}", e)))?,

            search_requests_total: register_counter_vec!(
                "verity_search_requests_total",
                "Total public diploma lookups",
                &["mode", "outcome"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register search_requests_total: {}", e)))?,

            import_rows_total: register_counter_vec!(
                "verity_import_rows_total",
                "Total spreadsheet rows processed by bulk import",
                &["status"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register import_rows_total: {}", e)))?,

            cache_hit_ratio: register_gauge!(
                "verity_cache_hit_ratio",
                "Search cache hit rate in percent"
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register cache_hit_ratio: {}", e)))?,
        })
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, &status_str])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    /// Record a public lookup (`outcome`: found, not_found, cached, rate_limited, ...).
    pub fn record_search(&self, mode: &str, outcome: &str) {
        self.search_requests_total
            .with_label_values(&[mode, outcome])
            .inc();
    }

    pub fn record_import_rows(&self, imported: u64, rejected: u64) {
        self.import_rows_total
            .with_label_values(&["imported"])
            .inc_by(imported as f64);
        self.import_rows_total
            .with_label_values(&["rejected"])
            .inc_by(rejected as f64);
    }

    pub fn set_cache_hit_ratio(&self, percent: f64) {
        self.cache_hit_ratio.set(percent);
    }
}

/// Handler for GET /metrics endpoint.
///
/// Returns Prometheus text format metrics.
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/metrics",
    tag = "Observability",
    responses(
        (status = 200, description = "Prometheus metrics in text format", content_type = "text/plain"),
        (status = 500, description = "Failed to encode metrics"),
    ),
))]
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}
