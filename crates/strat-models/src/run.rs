//! Pipeline run definitions and the run status state machine.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::blueprint::Blueprint;
use crate::stage::{IntentOutput, SeoMode, StrategyOutput};

/// Unique identifier for a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct RunId(pub String);

impl RunId {
    /// Generate a new random run ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State of a pipeline run.
///
/// Runs move along a fixed set of edges (see [`RunStatus::can_transition`]);
/// `rejected` and `failed` are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Run created, pipeline not started yet
    #[default]
    Pending,
    /// Stage 1: extracting persona, pain points, emotions
    ExtractingIntent,
    /// Stage 2: formulating SEO/GEO strategy
    FormulatingSeo,
    /// Stage 3: building the hub & spoke topic cluster
    Clustering,
    /// Blueprint generated, paused for human review
    AwaitingReview,
    /// Human approved, dispatch about to start
    Approved,
    /// Delivering the blueprint to the production system
    Dispatching,
    /// Blueprint delivered and acknowledged
    Completed,
    /// Unrecoverable system or delivery fault
    Failed,
    /// Input rejected before any strategy was generated
    Rejected,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::ExtractingIntent => "extracting_intent",
            RunStatus::FormulatingSeo => "formulating_seo",
            RunStatus::Clustering => "clustering",
            RunStatus::AwaitingReview => "awaiting_review",
            RunStatus::Approved => "approved",
            RunStatus::Dispatching => "dispatching",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Rejected => "rejected",
        }
    }

    /// Terminal states never transition again (except `failed`, which a
    /// redispatch may re-enter into `dispatching`).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Rejected
        )
    }

    /// States in which a stage or delivery call is in flight. A run parked
    /// in one of these beyond the stage timeout is a candidate for the
    /// stuck-run reaper. `awaiting_review` is excluded: waiting on a human
    /// is not stuck.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            RunStatus::ExtractingIntent
                | RunStatus::FormulatingSeo
                | RunStatus::Clustering
                | RunStatus::Dispatching
        )
    }

    /// Whether `self → next` is a legal edge of the run state machine.
    ///
    /// `failed → dispatching` is the redispatch edge: a run whose delivery
    /// failed after approval may be re-dispatched as a fresh approval
    /// attempt. Every other pair is rejected.
    pub fn can_transition(&self, next: RunStatus) -> bool {
        use RunStatus::*;
        matches!(
            (self, next),
            (Pending, ExtractingIntent)
                | (ExtractingIntent, FormulatingSeo)
                | (ExtractingIntent, Rejected)
                | (ExtractingIntent, Failed)
                | (FormulatingSeo, Clustering)
                | (FormulatingSeo, Failed)
                | (Clustering, AwaitingReview)
                | (Clustering, Failed)
                | (AwaitingReview, Approved)
                | (Approved, Dispatching)
                | (Dispatching, Completed)
                | (Dispatching, Failed)
                | (Failed, Dispatching)
        )
    }

    /// Human-readable stage label shown to polling clients.
    pub fn stage_label(&self) -> &'static str {
        match self {
            RunStatus::Pending => "Queued - waiting to start",
            RunStatus::ExtractingIntent => "Stage 1: Extracting Intent & Persona",
            RunStatus::FormulatingSeo => "Stage 2: Formulating SEO/GEO Strategy",
            RunStatus::Clustering => "Stage 3: Building Topic Cluster",
            RunStatus::AwaitingReview => "Stage 4: Awaiting Human Review",
            RunStatus::Approved => "Approved - Ready for Dispatch",
            RunStatus::Dispatching => "Stage 5: Dispatching to Production",
            RunStatus::Completed => "Completed",
            RunStatus::Failed => "Failed",
            RunStatus::Rejected => "Rejected",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Attempted a status transition not present in the state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid run transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: RunStatus,
    pub to: RunStatus,
}

/// One end-to-end execution of the blueprint pipeline for a single raw input.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Run {
    /// Unique run ID
    pub id: RunId,

    /// Current run status
    #[serde(default)]
    pub status: RunStatus,

    /// Human-readable label of the stage in progress or last completed.
    /// Always written together with `status` so pollers never observe a
    /// mismatched pair.
    pub current_stage: String,

    /// Original raw research text, immutable after creation
    pub raw_input: String,

    /// Generation model selected for this run, immutable after creation
    pub model_selector: String,

    /// Stage 1 output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<IntentOutput>,

    /// Stage 2 output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<StrategyOutput>,

    /// Stage 3 output: the blueprint awaiting review / dispatch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blueprint: Option<Blueprint>,

    /// Strategy-quality classification from stage 2
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seo_mode: Option<SeoMode>,

    /// Operator-facing explanation of `seo_mode`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seo_mode_reason: Option<String>,

    /// Last failure message; only set when `failed` or `rejected`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Who approved the blueprint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,

    /// When the blueprint was (last) approved; a redispatch records a fresh
    /// approval timestamp, which yields a fresh idempotency key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,

    /// Cross-system correlation ID, generated once at first dispatch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,

    /// Idempotency key for the current approval attempt; immutable across
    /// delivery retries of that attempt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,

    /// Total delivery attempts across all dispatches of this run
    #[serde(default)]
    pub dispatch_attempts: u32,

    /// Job ID echoed back by the production system's ack, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub production_job_id: Option<String>,

    /// Optimistic-concurrency version, bumped by the store on every write
    #[serde(default)]
    pub version: u64,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last transition timestamp
    pub updated_at: DateTime<Utc>,
}

impl Run {
    /// Create a new run in `pending`.
    pub fn new(raw_input: impl Into<String>, model_selector: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: RunId::new(),
            status: RunStatus::Pending,
            current_stage: RunStatus::Pending.stage_label().to_string(),
            raw_input: raw_input.into(),
            model_selector: model_selector.into(),
            intent: None,
            strategy: None,
            blueprint: None,
            seo_mode: None,
            seo_mode_reason: None,
            error: None,
            approved_by: None,
            approved_at: None,
            correlation_id: None,
            idempotency_key: None,
            dispatch_attempts: 0,
            production_job_id: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `next`, keeping `current_stage` and `updated_at` in sync.
    pub fn transition(&mut self, next: RunStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition(next) {
            return Err(InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.current_stage = next.stage_label().to_string();
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Move to `failed` with the fault message preserved verbatim.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), InvalidTransition> {
        self.transition(RunStatus::Failed)?;
        self.error = Some(error.into());
        Ok(())
    }

    /// Move to `rejected` with the user-remediable reason.
    pub fn reject(&mut self, reason: impl Into<String>) -> Result<(), InvalidTransition> {
        self.transition(RunStatus::Rejected)?;
        self.error = Some(reason.into());
        Ok(())
    }

    /// Whether the run is in a terminal state (pollers can stop).
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether a blueprint is available to read (`awaiting_review` or later).
    pub fn blueprint_ready(&self) -> bool {
        matches!(
            self.status,
            RunStatus::AwaitingReview
                | RunStatus::Approved
                | RunStatus::Dispatching
                | RunStatus::Completed
        ) && self.blueprint.is_some()
    }
}
