//! Prometheus metrics for the API server.

use std::time::Instant;

use axum::body::Body;
use axum::extract::MatchedPath;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for `/metrics`.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names.
pub mod names {
    pub const HTTP_REQUESTS_TOTAL: &str = "pixvault_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "pixvault_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "pixvault_http_requests_in_flight";

    pub const QUEUE_LENGTH: &str = "pixvault_queue_length";
    pub const QUEUE_DLQ_LENGTH: &str = "pixvault_queue_dlq_length";
    pub const JOBS_ENQUEUED_TOTAL: &str = "pixvault_jobs_enqueued_total";
    pub const JOBS_STALE_TOTAL: &str = "pixvault_jobs_stale_total";

    pub const UPLOADS_TOTAL: &str = "pixvault_uploads_total";
    pub const UPLOAD_BYTES_TOTAL: &str = "pixvault_upload_bytes_total";

    pub const RATE_LIMIT_HITS_TOTAL: &str = "pixvault_rate_limit_hits_total";
}

pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", path.to_string()),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn set_queue_length(length: u64) {
    gauge!(names::QUEUE_LENGTH).set(length as f64);
}

pub fn set_dlq_length(length: u64) {
    gauge!(names::QUEUE_DLQ_LENGTH).set(length as f64);
}

pub fn record_job_enqueued(kind: &str) {
    let labels = [("kind", kind.to_string())];
    counter!(names::JOBS_ENQUEUED_TOTAL, &labels).increment(1);
}

pub fn record_stale_jobs(count: usize) {
    counter!(names::JOBS_STALE_TOTAL).increment(count as u64);
}

pub fn record_upload(kind: &str, bytes: u64) {
    let labels = [("kind", kind.to_string())];
    counter!(names::UPLOADS_TOTAL, &labels).increment(1);
    counter!(names::UPLOAD_BYTES_TOTAL, &labels).increment(bytes);
}

pub fn record_rate_limit_hit(endpoint: &str) {
    let labels = [("endpoint", endpoint.to_string())];
    counter!(names::RATE_LIMIT_HITS_TOTAL, &labels).increment(1);
}

/// Metrics middleware for HTTP requests.
///
/// Requests are labelled with the route template (`/api/media/:id`), never
/// the raw path, to keep label cardinality bounded.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);
    let response = next.run(request).await;
    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    record_http_request(
        &method,
        &path,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );

    response
}
