//! API handlers.

pub mod health;
pub mod pipeline;

pub use health::health;
pub use pipeline::{
    approve_pipeline, get_pipeline_blueprint, get_pipeline_status, list_pipeline_runs,
    redispatch_pipeline, start_pipeline,
};
