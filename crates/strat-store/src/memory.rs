//! In-memory run store.
//!
//! Backs the service in single-process deployments and in tests. The lock
//! is only held for the duration of the map operation itself, never across
//! an await point, so concurrent pipelines do not serialize on it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use strat_models::{Run, RunId};

use crate::error::{StoreError, StoreResult};
use crate::RunStore;

/// In-memory [`RunStore`] keyed by run ID.
#[derive(Clone, Default)]
pub struct MemoryRunStore {
    runs: Arc<RwLock<HashMap<RunId, Run>>>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored runs.
    pub async fn len(&self) -> usize {
        self.runs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.runs.read().await.is_empty()
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn create(&self, mut run: Run) -> StoreResult<Run> {
        let mut runs = self.runs.write().await;
        if runs.contains_key(&run.id) {
            return Err(StoreError::AlreadyExists(run.id.clone()));
        }
        run.version = 1;
        runs.insert(run.id.clone(), run.clone());
        debug!(run_id = %run.id, "Created run");
        Ok(run)
    }

    async fn get(&self, id: &RunId) -> StoreResult<Run> {
        self.runs
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn update(&self, mut run: Run) -> StoreResult<Run> {
        let mut runs = self.runs.write().await;
        let stored = runs
            .get(&run.id)
            .ok_or_else(|| StoreError::NotFound(run.id.clone()))?;

        if stored.version != run.version {
            return Err(StoreError::VersionConflict {
                id: run.id.clone(),
                expected: run.version,
                actual: stored.version,
            });
        }

        run.version += 1;
        runs.insert(run.id.clone(), run.clone());
        debug!(run_id = %run.id, status = %run.status, version = run.version, "Updated run");
        Ok(run)
    }

    async fn list(&self) -> StoreResult<Vec<Run>> {
        let runs = self.runs.read().await;
        let mut all: Vec<Run> = runs.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }
}
