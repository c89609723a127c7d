//! Axum HTTP API for the strategy engine.
//!
//! Exposes the pipeline surface: start a run, poll its status, fetch the
//! generated blueprint, approve it for dispatch, and redispatch after a
//! delivery failure.

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
