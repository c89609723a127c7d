//! Dispatch error types.

use thiserror::Error;

pub type DispatchResult<T> = Result<T, DispatchError>;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("PRODUCTION_WEBHOOK_URL is not configured")]
    NotConfigured,

    #[error("production system rejected the payload ({status}): {body}")]
    NonRetryable { status: u16, body: String },

    #[error("delivery failed after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },

    #[error("failed to serialize blueprint payload: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid webhook signing key: {0}")]
    SigningKey(String),
}
