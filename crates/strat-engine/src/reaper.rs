//! Background task that fails runs stuck in an in-flight stage.
//!
//! A run parked in a generation or dispatch stage beyond the configured
//! timeout (crashed worker, hung provider call) is forced to `failed`
//! through the same versioned store path as normal transitions, so a race
//! with a late stage completion resolves cleanly: one writer wins, the
//! other re-reads and stands down.

use std::sync::Arc;

use chrono::Utc;
use tokio::time::interval;
use tracing::{error, info, warn};

use strat_store::RunStore;

use crate::config::ReaperConfig;

pub struct StuckRunReaper {
    store: Arc<dyn RunStore>,
    config: ReaperConfig,
}

impl StuckRunReaper {
    pub fn new(store: Arc<dyn RunStore>, config: ReaperConfig) -> Self {
        Self { store, config }
    }

    /// Run the detection loop forever. Spawn as a background task.
    pub async fn run(&self) {
        if !self.config.enabled {
            info!("Stuck-run reaper is disabled");
            return;
        }

        info!(
            interval_secs = self.config.interval.as_secs(),
            timeout_secs = self.config.stage_timeout.as_secs(),
            "Starting stuck-run reaper"
        );

        let mut ticker = interval(self.config.interval);
        loop {
            ticker.tick().await;
            if let Err(e) = self.check_once().await {
                error!("Stuck-run scan error: {e}");
            }
        }
    }

    /// Run a single scan. Returns (stuck, reaped) counts.
    pub async fn check_once(&self) -> anyhow::Result<(u32, u32)> {
        let runs = self.store.list().await?;
        let now = Utc::now();
        let timeout_secs = self.config.stage_timeout.as_secs() as i64;

        let mut stuck = 0u32;
        let mut reaped = 0u32;

        for mut run in runs {
            if !run.status.is_in_flight() {
                continue;
            }
            let idle_secs = (now - run.updated_at).num_seconds();
            if idle_secs <= timeout_secs {
                continue;
            }

            stuck += 1;
            warn!(
                run_id = %run.id,
                status = %run.status,
                idle_secs,
                "Detected stuck run"
            );

            let message = format!(
                "Stage '{}' timed out after {idle_secs}s with no progress. \
                 The pipeline worker may have crashed.",
                run.current_stage
            );
            if run.fail(message).is_err() {
                continue;
            }

            match self.store.update(run).await {
                Ok(stored) => {
                    reaped += 1;
                    info!(run_id = %stored.id, "Forced stuck run to failed");
                }
                // Lost the race to a normal stage completion; that write
                // stands and the run is no longer stuck.
                Err(e) if e.is_conflict() => {
                    info!("Stuck run resolved concurrently, skipping");
                }
                Err(e) => error!("Failed to reap stuck run: {e}"),
            }
        }

        if stuck > 0 {
            info!("Stuck-run scan complete: {stuck} stuck, {reaped} reaped");
        }
        Ok((stuck, reaped))
    }
}
