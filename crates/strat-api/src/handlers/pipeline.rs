//! Pipeline run handlers.
//!
//! The write path is start → (poll status) → approve; `redispatch` exists
//! for runs whose delivery failed after approval. Status polling clients
//! stop on the terminal states (`completed`, `failed`, `rejected`).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use validator::Validate;

use strat_models::{Blueprint, Run, RunId, RunStatus, SeoMode};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

// ============================================================================
// Types
// ============================================================================

/// Request body for starting a pipeline run.
#[derive(Debug, Deserialize, Validate)]
pub struct StartPipelineRequest {
    /// Raw research text (comments, notes, competitor data)
    #[validate(length(min = 1, max = 100_000, message = "raw_text must be 1-100000 characters"))]
    pub raw_text: String,
    /// Generation model to use for this run
    #[serde(default)]
    #[validate(length(max = 64, message = "model name too long"))]
    pub model: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StartPipelineResponse {
    pub run_id: String,
    pub status: RunStatus,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct RunStatusResponse {
    pub run_id: String,
    pub status: RunStatus,
    pub current_stage: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seo_mode: Option<SeoMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seo_mode_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Run> for RunStatusResponse {
    fn from(run: Run) -> Self {
        Self {
            run_id: run.id.to_string(),
            status: run.status,
            current_stage: run.current_stage,
            seo_mode: run.seo_mode,
            seo_mode_reason: run.seo_mode_reason,
            error: run.error,
            created_at: run.created_at.to_rfc3339(),
            updated_at: run.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BlueprintResponse {
    pub run_id: String,
    pub status: RunStatus,
    pub blueprint: Blueprint,
}

/// Request body for the approval call.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct ApproveRequest {
    /// Username recorded on the blueprint
    #[serde(default)]
    #[validate(length(max = 128, message = "approved_by too long"))]
    pub approved_by: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ApproveResponse {
    pub run_id: String,
    pub status: RunStatus,
}

#[derive(Debug, Serialize)]
pub struct ListRunsResponse {
    pub runs: Vec<RunStatusResponse>,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/pipeline/start
///
/// Create a run and begin the generation pipeline in the background.
/// Returns 202 with the run ID; poll the status endpoint for progress.
pub async fn start_pipeline(
    State(state): State<AppState>,
    Json(request): Json<StartPipelineRequest>,
) -> ApiResult<(StatusCode, Json<StartPipelineResponse>)> {
    request
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let run = state
        .coordinator
        .start(&request.raw_text, request.model)
        .await?;

    metrics::record_run_started(&run.model_selector);

    Ok((
        StatusCode::ACCEPTED,
        Json(StartPipelineResponse {
            run_id: run.id.to_string(),
            status: run.status,
            message: "Pipeline started. Poll the status endpoint to track progress.".to_string(),
        }),
    ))
}

/// GET /api/pipeline/:run_id/status
pub async fn get_pipeline_status(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> ApiResult<Json<RunStatusResponse>> {
    let run = state.coordinator.status(&RunId::from_string(run_id)).await?;
    Ok(Json(run.into()))
}

/// GET /api/pipeline/:run_id/blueprint
///
/// Only available once the run has reached `awaiting_review` or later;
/// 409 before that.
pub async fn get_pipeline_blueprint(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> ApiResult<Json<BlueprintResponse>> {
    let run_id = RunId::from_string(run_id);
    let run = state.coordinator.status(&run_id).await?;
    let blueprint = state.coordinator.blueprint(&run_id).await?;
    Ok(Json(BlueprintResponse {
        run_id: run_id.to_string(),
        status: run.status,
        blueprint,
    }))
}

/// POST /api/pipeline/:run_id/approve
///
/// The human-in-the-loop gate. Idempotent; a run already past approval
/// returns its current status without re-dispatching.
pub async fn approve_pipeline(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    body: Option<Json<ApproveRequest>>,
) -> ApiResult<Json<ApproveResponse>> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    request
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let run_id = RunId::from_string(run_id);
    let status = state
        .coordinator
        .approve(&run_id, request.approved_by)
        .await?;

    metrics::record_run_approved();

    Ok(Json(ApproveResponse {
        run_id: run_id.to_string(),
        status,
    }))
}

/// POST /api/pipeline/:run_id/redispatch
///
/// Retry delivery for a run that failed during dispatch. Recorded as a
/// fresh approval attempt with a fresh idempotency key.
pub async fn redispatch_pipeline(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> ApiResult<Json<ApproveResponse>> {
    let run_id = RunId::from_string(run_id);
    let status = state.coordinator.redispatch(&run_id).await?;

    metrics::record_run_redispatched();

    Ok(Json(ApproveResponse {
        run_id: run_id.to_string(),
        status,
    }))
}

/// GET /api/pipeline
///
/// All runs, most recent first, for operator dashboards.
pub async fn list_pipeline_runs(
    State(state): State<AppState>,
) -> ApiResult<Json<ListRunsResponse>> {
    let runs = state.coordinator.list().await?;
    Ok(Json(ListRunsResponse {
        runs: runs.into_iter().map(Into::into).collect(),
    }))
}
