//! Store error types.

use strat_models::RunId;
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("run '{0}' not found")]
    NotFound(RunId),

    #[error("run '{0}' already exists")]
    AlreadyExists(RunId),

    #[error("version conflict on run '{id}': expected {expected}, found {actual}")]
    VersionConflict {
        id: RunId,
        expected: u64,
        actual: u64,
    },
}

impl StoreError {
    /// A conflict means another writer won the race; the caller should
    /// re-read and decide whether its write still applies.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::VersionConflict { .. })
    }
}
