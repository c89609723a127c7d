//! Stage executors.
//!
//! Each executor takes the accumulated context of prior stage outputs,
//! calls the generation service once, and validates the structured result.
//! Retry policy lives in the coordinator, not here: one call, one attempt.

mod cluster;
mod intent;
mod strategy;

pub use cluster::ClusterStage;
pub use intent::IntentStage;
pub use strategy::{evaluate_seo_mode, SeoModeDecision, StrategyStage};

use serde::de::DeserializeOwned;

use crate::error::StageError;

/// Deserialize a generation response into the stage's expected schema.
/// A mismatch is a validation fault (the model produced the wrong shape),
/// retried once by the coordinator before escalation.
pub(crate) fn parse_stage_output<T: DeserializeOwned>(
    value: serde_json::Value,
    what: &str,
) -> Result<T, StageError> {
    serde_json::from_value(value)
        .map_err(|e| StageError::validation(format!("malformed {what} output: {e}")))
}
