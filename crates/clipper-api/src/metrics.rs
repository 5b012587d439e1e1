//! Prometheus metrics for the API server.

use std::sync::OnceLock;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use regex_lite::Regex;

/// Install the Prometheus recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    pub const HTTP_REQUESTS_TOTAL: &str = "clipper_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "clipper_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "clipper_http_requests_in_flight";
    pub const RATE_LIMIT_HITS_TOTAL: &str = "clipper_rate_limit_hits_total";
    pub const CLIP_BYTES_SENT_TOTAL: &str = "clipper_clip_bytes_sent_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record rate limit hit.
pub fn record_rate_limit_hit(endpoint: &str) {
    let labels = [("endpoint", sanitize_path(endpoint))];
    counter!(names::RATE_LIMIT_HITS_TOTAL, &labels).increment(1);
}

/// Record bytes of a clip handed to the response body.
pub fn record_clip_bytes(format: &str, bytes: u64) {
    let labels = [("format", format.to_string())];
    counter!(names::CLIP_BYTES_SENT_TOTAL, &labels).increment(bytes);
}

/// Collapse job ids so label cardinality stays bounded.
fn sanitize_path(path: &str) -> String {
    static JOB_PATH: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = JOB_PATH.get_or_init(|| Regex::new(r"^/jobs/[^/]+").ok());
    match pattern {
        Some(re) => re.replace(path, "/jobs/:job_id").to_string(),
        None => path.to_string(),
    }
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);
    // Also runs when the request future is dropped mid-flight
    scopeguard::defer! {
        gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);
    }

    let response = next.run(request).await;

    record_http_request(&method, &path, response.status().as_u16(), start.elapsed().as_secs_f64());

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(sanitize_path("/jobs/550e8400-e29b-41d4-a716-446655440000"), "/jobs/:job_id");
        assert_eq!(sanitize_path("/jobs"), "/jobs");
        assert_eq!(sanitize_path("/clip"), "/clip");
    }
}
