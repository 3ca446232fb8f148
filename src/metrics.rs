//! Prometheus metrics for RecycleGate.
//!
//! Installs a global Prometheus recorder using `metrics-exporter-prometheus`,
//! defines metric name constants, provides a Tower-compatible middleware for
//! HTTP RED metrics, and exposes the `/metrics` endpoint handler.

use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

// -- Metric name constants ----------------------------------------------------

/// Total HTTP requests (counter). Labels: method, path, status.
pub const HTTP_REQUESTS_TOTAL: &str = "recyclegate_http_requests_total";

/// HTTP request duration in seconds (histogram). Labels: method, path.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "recyclegate_http_request_duration_seconds";

/// Requests the gateway answered itself instead of passing through
/// (counter). Labels: resource (account|object), action
/// (masked|rejected|marked|unmarked).
pub const INTERCEPTIONS_TOTAL: &str = "recyclegate_interceptions_total";

// -- Global recorder installation ---------------------------------------------

/// Singleton handle to the Prometheus recorder.
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
    describe_counter!(
        INTERCEPTIONS_TOTAL,
        "Requests answered by the recycle gate itself"
    );
}

// -- Metrics middleware -------------------------------------------------------

/// Axum middleware that records HTTP RED metrics for every request.
///
/// Excludes `/metrics` from self-instrumentation to avoid feedback loops.
/// Must be the outermost layer so it captures the full request lifecycle.
pub async fn metrics_middleware(
    req: Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Response {
    let method = req.method().to_string();
    let path = normalize_path(req.uri().path());

    // Do not instrument the metrics endpoint itself.
    if req.uri().path() == "/metrics" {
        return next.run(req).await;
    }

    let start = Instant::now();
    let response = next.run(req).await;
    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "path" => path.clone(), "status" => status).increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "path" => path).record(duration);

    response
}

// -- Path normalization -------------------------------------------------------

/// Normalize an actual request path to a route template for metric labels.
///
/// This prevents high-cardinality labels from unique account, container and
/// object names.
///
/// Examples:
/// - `/health` -> `/health`
/// - `/v1/AUTH_admin` -> `/{version}/{account}`
/// - `/v1/AUTH_admin/photos` -> `/{version}/{account}/{container}`
/// - `/v1/AUTH_admin/photos/cat.jpg` -> `/{version}/{account}/{container}/{object}`
fn normalize_path(path: &str) -> String {
    match path {
        "/" | "/health" | "/metrics" => path.to_string(),
        _ => {
            let depth = path
                .trim_start_matches('/')
                .trim_end_matches('/')
                .split('/')
                .filter(|s| !s.is_empty())
                .count();
            match depth {
                0 => "/".to_string(),
                1 => "/{version}".to_string(),
                2 => "/{version}/{account}".to_string(),
                3 => "/{version}/{account}/{container}".to_string(),
                _ => "/{version}/{account}/{container}/{object}".to_string(),
            }
        }
    }
}

// -- Metrics endpoint handler -------------------------------------------------

/// `GET /metrics` -- Render Prometheus exposition format text.
pub async fn metrics_handler() -> impl IntoResponse {
    let handle = PROMETHEUS_HANDLE
        .get()
        .expect("Prometheus recorder not initialized");
    let body = handle.render();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        body,
    )
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_fixed_routes() {
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("/health"), "/health");
        assert_eq!(normalize_path("/metrics"), "/metrics");
    }

    #[test]
    fn test_normalize_path_account() {
        assert_eq!(normalize_path("/v1/AUTH_admin"), "/{version}/{account}");
    }

    #[test]
    fn test_normalize_path_container() {
        assert_eq!(
            normalize_path("/v1/AUTH_admin/photos"),
            "/{version}/{account}/{container}"
        );
        assert_eq!(
            normalize_path("/v1/AUTH_admin/photos/"),
            "/{version}/{account}/{container}"
        );
    }

    #[test]
    fn test_normalize_path_object() {
        assert_eq!(
            normalize_path("/v1/AUTH_admin/photos/cat.jpg"),
            "/{version}/{account}/{container}/{object}"
        );
        assert_eq!(
            normalize_path("/v1/a/c/deep/nested/key.bin"),
            "/{version}/{account}/{container}/{object}"
        );
    }
}
