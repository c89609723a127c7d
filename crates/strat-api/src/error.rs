//! API error taxonomy and response mapping.
//!
//! Every handler failure renders as `{"detail": "..."}` with the matching
//! status code. Internal faults are redacted outside development so store
//! or provider internals never leak to callers.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use strat_engine::CoordinatorError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The message callers are allowed to see.
    fn public_detail(&self) -> String {
        let redact = matches!(self, ApiError::Internal(_))
            && std::env::var("ENVIRONMENT").unwrap_or_default() == "production";
        if redact {
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        }
    }
}

impl From<CoordinatorError> for ApiError {
    fn from(e: CoordinatorError) -> Self {
        match &e {
            CoordinatorError::NotFound(_) => ApiError::NotFound(e.to_string()),
            CoordinatorError::InvalidState { .. } | CoordinatorError::NotReady { .. } => {
                ApiError::Conflict(e.to_string())
            }
            CoordinatorError::InvalidInput(_) => ApiError::BadRequest(e.to_string()),
            CoordinatorError::Store(_) => ApiError::Internal(e.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            detail: self.public_detail(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}
