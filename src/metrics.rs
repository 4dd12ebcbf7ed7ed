//! Prometheus metrics.
//!
//! Installs a global Prometheus recorder using `metrics-exporter-prometheus`,
//! defines metric name constants, provides an axum middleware for HTTP RED
//! metrics, and exposes the `/metrics` endpoint handler.

use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

// -- Metric name constants ----------------------------------------------------

/// Total HTTP requests (counter). Labels: method, path, status.
pub const HTTP_REQUESTS_TOTAL: &str = "cosi_blob_http_requests_total";

/// HTTP request duration in seconds (histogram). Labels: method, path.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "cosi_blob_http_request_duration_seconds";

/// Total blob store operations (counter). Labels: operation, outcome.
pub const BLOB_OPERATIONS_TOTAL: &str = "cosi_blob_operations_total";

/// Total payload bytes uploaded to the store (counter).
pub const BYTES_UPLOADED_TOTAL: &str = "cosi_blob_bytes_uploaded_total";

/// Total payload bytes downloaded from the store (counter).
pub const BYTES_DOWNLOADED_TOTAL: &str = "cosi_blob_bytes_downloaded_total";

// -- Global recorder installation ---------------------------------------------

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus metrics recorder. Idempotent -- safe to call
/// multiple times (e.g. in tests). Returns a reference to the global handle.
pub fn init_metrics() -> &'static PrometheusHandle {
    PROMETHEUS_HANDLE.get_or_init(|| {
        PrometheusBuilder::new()
            .install_recorder()
            .expect("failed to install Prometheus recorder")
    })
}

/// Register metric descriptions with the global recorder. Call once after
/// `init_metrics()`.
pub fn describe_metrics() {
    describe_counter!(HTTP_REQUESTS_TOTAL, "Total HTTP requests");
    describe_histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );
    describe_counter!(BLOB_OPERATIONS_TOTAL, "Blob store operations by type and outcome");
    describe_counter!(BYTES_UPLOADED_TOTAL, "Total payload bytes uploaded");
    describe_counter!(BYTES_DOWNLOADED_TOTAL, "Total payload bytes downloaded");
}

/// Record the outcome of one blob store operation.
pub fn record_operation(operation: &'static str, outcome: &'static str) {
    counter!(BLOB_OPERATIONS_TOTAL, "operation" => operation, "outcome" => outcome).increment(1);
}

// -- Metrics middleware -------------------------------------------------------

/// Axum middleware that records HTTP RED metrics for every request.
///
/// Excludes `/metrics` from self-instrumentation.
pub async fn metrics_middleware(
    req: Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Response {
    if req.uri().path() == "/metrics" {
        return next.run(req).await;
    }

    let method = req.method().to_string();
    let path = normalize_path(req.uri().path());

    let start = Instant::now();
    let response = next.run(req).await;
    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "path" => path, "status" => status).increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "path" => path).record(duration);

    response
}

// -- Path normalization -------------------------------------------------------

/// Normalize a request path to its route template for metric labels.
///
/// Keeps blob and container names out of label values:
/// - `/get/report.txt` -> `/get/{name}`
/// - `/put/con/report.txt` -> `/put/{container}/{blob}`
/// - `/put/` -> `/put/`
/// - unknown paths -> `other`
fn normalize_path(path: &str) -> &'static str {
    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    match segments.as_slice() {
        [""] => "/",
        ["health"] => "/health",
        ["openapi.json"] => "/openapi.json",
        ["refresh"] => "/refresh",
        ["put", ""] => "/put/",
        ["get", name] if !name.is_empty() => "/get/{name}",
        ["put", name] if !name.is_empty() => "/put/{name}",
        ["createcon", name] if !name.is_empty() => "/createcon/{name}",
        ["get", _, _] => "/get/{container}/{blob}",
        ["put", _, _] => "/put/{container}/{blob}",
        _ => "other",
    }
}

// -- Metrics endpoint handler -------------------------------------------------

/// `GET /metrics` -- Render Prometheus exposition format text.
pub async fn metrics_handler() -> Response {
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not initialized").into_response(),
    }
}

// -- Tests --------------------------------------------------------------------
