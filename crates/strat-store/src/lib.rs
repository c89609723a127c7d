//! Run store: the persistence boundary for pipeline runs.
//!
//! The store is the only shared mutable state in the system. Every
//! mutation is a versioned read-modify-write scoped to a single run, so a
//! stage-completion callback and the stuck-run reaper can race on the same
//! run without losing updates: the loser gets [`StoreError::VersionConflict`].

mod error;
mod memory;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryRunStore;

use async_trait::async_trait;
use strat_models::{Run, RunId};

/// Persistence interface for pipeline runs.
///
/// Implementations must apply [`RunStore::update`] atomically: the write
/// succeeds only when the caller's `version` matches the stored one, and
/// the stored version is bumped in the same operation.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Persist a new run. Fails with [`StoreError::AlreadyExists`] when the
    /// run ID is taken.
    async fn create(&self, run: Run) -> StoreResult<Run>;

    /// Fetch a run by ID.
    async fn get(&self, id: &RunId) -> StoreResult<Run>;

    /// Replace a run, compare-and-swap on `run.version`. Returns the stored
    /// run with its version bumped.
    async fn update(&self, run: Run) -> StoreResult<Run>;

    /// All runs, most recently created first.
    async fn list(&self) -> StoreResult<Vec<Run>>;
}
