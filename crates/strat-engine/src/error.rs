//! Engine error types.

use strat_llm::GenerationError;
use strat_models::{RunId, RunStatus};
use strat_store::StoreError;
use thiserror::Error;

/// Classified failure of a single stage execution attempt.
///
/// The classification decides the run's fate: `Rejected` terminates the
/// run as `rejected` (caller-remediable, never retried), `Provider` is
/// retried with backoff, `Validation` gets one free retry before being
/// treated like a provider fault, and `Fatal` fails the run immediately.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("{reason}")]
    Rejected { reason: String },

    #[error("{message}")]
    Provider { message: String },

    #[error("{message}")]
    Validation { message: String },

    #[error("{message}")]
    Fatal { message: String },
}

impl StageError {
    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
        }
    }
}

impl From<GenerationError> for StageError {
    fn from(e: GenerationError) -> Self {
        match &e {
            GenerationError::EmptyResponse | GenerationError::MalformedJson(_) => {
                StageError::validation(e.to_string())
            }
            _ if e.is_retryable() => StageError::provider(e.to_string()),
            // Non-retryable API rejections and misconfiguration cannot
            // succeed on retry; fail the run with the cause preserved.
            _ => StageError::fatal(e.to_string()),
        }
    }
}

pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

/// Typed failures returned by the coordinator's public operations. No
/// internal fault escapes as a panic.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("run '{0}' not found")]
    NotFound(RunId),

    #[error("cannot {action} run '{run_id}' in status '{status}'")]
    InvalidState {
        run_id: RunId,
        status: RunStatus,
        action: &'static str,
    },

    #[error("blueprint for run '{run_id}' not ready (status '{status}')")]
    NotReady { run_id: RunId, status: RunStatus },

    #[error("{0}")]
    InvalidInput(String),

    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for CoordinatorError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => CoordinatorError::NotFound(id),
            other => CoordinatorError::Store(other),
        }
    }
}
