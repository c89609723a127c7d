//! Generation client error types.

use thiserror::Error;

pub type GenerationResult<T> = Result<T, GenerationError>;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("generation service returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("generation service rate-limited the request")]
    RateLimited,

    #[error("generation response contained no content")]
    EmptyResponse,

    #[error("generation response is not valid JSON: {0}")]
    MalformedJson(String),

    #[error("generation client misconfigured: {0}")]
    Misconfigured(String),
}

impl GenerationError {
    /// Transient faults the caller may retry with backoff. Malformed
    /// output is handled separately (one schema retry, then escalated).
    pub fn is_retryable(&self) -> bool {
        match self {
            GenerationError::Network(_) | GenerationError::RateLimited => true,
            GenerationError::Api { status, .. } => *status >= 500,
            GenerationError::EmptyResponse
            | GenerationError::MalformedJson(_)
            | GenerationError::Misconfigured(_) => false,
        }
    }
}
