//! Prometheus metrics.
//!
//! The recorder is installed once at startup; `/metrics` renders from the
//! returned handle. Route labels are normalized so per-run URLs do not
//! explode label cardinality.

use std::sync::OnceLock;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use regex::Regex;

/// Install the global Prometheus recorder.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder")
}

pub mod names {
    pub const HTTP_REQUESTS_TOTAL: &str = "strat_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "strat_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "strat_http_requests_in_flight";

    pub const RUNS_STARTED_TOTAL: &str = "strat_runs_started_total";
    pub const RUNS_APPROVED_TOTAL: &str = "strat_runs_approved_total";
    pub const RUNS_REDISPATCHED_TOTAL: &str = "strat_runs_redispatched_total";

    pub const RATE_LIMIT_HITS_TOTAL: &str = "strat_rate_limit_hits_total";
}

pub fn record_run_started(model: &str) {
    counter!(names::RUNS_STARTED_TOTAL, "model" => model.to_string()).increment(1);
}

pub fn record_run_approved() {
    counter!(names::RUNS_APPROVED_TOTAL).increment(1);
}

pub fn record_run_redispatched() {
    counter!(names::RUNS_REDISPATCHED_TOTAL).increment(1);
}

pub fn record_rate_limit_hit(endpoint: &str) {
    counter!(names::RATE_LIMIT_HITS_TOTAL, "endpoint" => endpoint.to_string()).increment(1);
}

/// Collapse run IDs in a request path to `:run_id`. Run-scoped routes
/// always carry a suffix (`/status`, `/approve`, ...), so an ID segment is
/// one followed by a slash; `/pipeline/start` stays intact.
fn route_label(path: &str) -> String {
    static RUN_SEGMENT: OnceLock<Regex> = OnceLock::new();
    let pattern = RUN_SEGMENT
        .get_or_init(|| Regex::new(r"/pipeline/[A-Za-z0-9_-]+/").expect("static pattern"));
    pattern.replace_all(path, "/pipeline/:run_id/").to_string()
}

pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let route = route_label(request.uri().path());
    let started = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);
    let response = next.run(request).await;
    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let labels = [
        ("method", method),
        ("path", route),
        ("status", response.status().as_u16().to_string()),
    ];
    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels)
        .record(started.elapsed().as_secs_f64());

    response
}
