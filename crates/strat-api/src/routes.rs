//! API routes.

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::health;
use crate::handlers::{
    approve_pipeline, get_pipeline_blueprint, get_pipeline_status, list_pipeline_runs,
    redispatch_pipeline, start_pipeline,
};
use crate::metrics::metrics_middleware;
use crate::middleware::{
    cors_layer, rate_limit_middleware, request_id, request_logging, security_headers,
    RateLimiterCache,
};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let pipeline_routes = Router::new()
        .route("/pipeline/start", post(start_pipeline))
        .route("/pipeline/:run_id/status", get(get_pipeline_status))
        .route("/pipeline/:run_id/blueprint", get(get_pipeline_blueprint))
        .route("/pipeline/:run_id/approve", post(approve_pipeline))
        .route("/pipeline/:run_id/redispatch", post(redispatch_pipeline))
        .route("/pipeline", get(list_pipeline_runs));

    let rate_limiter = Arc::new(RateLimiterCache::new(state.config.rate_limit_rps));

    let api_routes = Router::new().merge(pipeline_routes).layer(
        middleware::from_fn_with_state(rate_limiter, rate_limit_middleware),
    );

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health));

    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
