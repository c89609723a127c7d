//! Run coordinator: drives runs through the stage state machine.
//!
//! The coordinator owns all persistence. Every transition is a versioned
//! read-modify-write through the run store, and no store access is held
//! across a generation or delivery call, so concurrent runs and the
//! stuck-run reaper can interleave safely: whoever loses a version race
//! re-reads and either retries or stands down.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use strat_dispatch::{generate_correlation_id, generate_idempotency_key, Dispatch, DispatchError};
use strat_llm::GenerationClient;
use strat_models::{Blueprint, InvalidTransition, Run, RunId, RunStatus};
use strat_store::RunStore;

use crate::config::PipelineConfig;
use crate::error::{CoordinatorError, CoordinatorResult, StageError};
use crate::guard::InputGuard;
use crate::stages::{ClusterStage, IntentStage, StrategyStage};

/// Terminal outcome of a stage after the retry budget is applied.
enum StageFailure {
    /// Content-quality rejection; the run ends `rejected`
    Rejected(String),
    /// System fault; the run ends `failed`
    Failed(String),
}

pub struct Coordinator {
    store: Arc<dyn RunStore>,
    dispatcher: Arc<dyn Dispatch>,
    intent: IntentStage,
    strategy: StrategyStage,
    cluster: ClusterStage,
    config: PipelineConfig,
}

impl Coordinator {
    pub fn new(
        store: Arc<dyn RunStore>,
        llm: Arc<dyn GenerationClient>,
        dispatcher: Arc<dyn Dispatch>,
        config: PipelineConfig,
    ) -> Self {
        let guard = InputGuard::new(config.guard.clone());
        Self {
            intent: IntentStage::new(Arc::clone(&llm), guard),
            strategy: StrategyStage::new(Arc::clone(&llm), config.min_viable_volume),
            cluster: ClusterStage::new(llm),
            store,
            dispatcher,
            config,
        }
    }

    // ------------------------------------------------------------------
    // Public operations
    // ------------------------------------------------------------------

    /// Create a run and start driving it in the background.
    ///
    /// Input shorter than the configured minimum is an input-validation
    /// error: no run is created. Deeper content-quality checks happen in
    /// the intent stage and end the run as `rejected`.
    pub async fn start(
        self: &Arc<Self>,
        raw_text: &str,
        model_selector: Option<String>,
    ) -> CoordinatorResult<Run> {
        let trimmed = raw_text.trim();
        if trimmed.chars().count() < self.config.min_input_chars {
            return Err(CoordinatorError::InvalidInput(format!(
                "raw_text must be at least {} characters",
                self.config.min_input_chars
            )));
        }

        let model = model_selector
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.config.default_model.clone());

        let run = self.store.create(Run::new(trimmed, model)).await?;
        info!(run_id = %run.id, model = %run.model_selector, "Pipeline run created");

        let this = Arc::clone(self);
        let run_id = run.id.clone();
        tokio::spawn(async move {
            this.drive(run_id).await;
        });

        Ok(run)
    }

    /// Current state of a run.
    pub async fn status(&self, run_id: &RunId) -> CoordinatorResult<Run> {
        self.get(run_id).await
    }

    /// The generated blueprint, once the run has reached review or later.
    pub async fn blueprint(&self, run_id: &RunId) -> CoordinatorResult<Blueprint> {
        let run = self.get(run_id).await?;
        match &run.blueprint {
            Some(bp) if run.blueprint_ready() => Ok(bp.clone()),
            _ => Err(CoordinatorError::NotReady {
                run_id: run_id.clone(),
                status: run.status,
            }),
        }
    }

    /// All runs, most recent first.
    pub async fn list(&self) -> CoordinatorResult<Vec<Run>> {
        Ok(self.store.list().await?)
    }

    /// Record human approval and continue into dispatch.
    ///
    /// Idempotent: a run already `approved`, `dispatching`, or `completed`
    /// returns its current status without triggering another delivery.
    /// Only the caller whose compare-and-swap from `awaiting_review` wins
    /// hands the blueprint to the dispatcher.
    pub async fn approve(
        self: &Arc<Self>,
        run_id: &RunId,
        approved_by: Option<String>,
    ) -> CoordinatorResult<RunStatus> {
        loop {
            let mut run = self.get(run_id).await?;
            match run.status {
                RunStatus::Approved | RunStatus::Dispatching | RunStatus::Completed => {
                    return Ok(run.status)
                }
                RunStatus::AwaitingReview => {}
                status => {
                    return Err(CoordinatorError::InvalidState {
                        run_id: run_id.clone(),
                        status,
                        action: "approve",
                    })
                }
            }

            let approver = approved_by
                .clone()
                .filter(|a| !a.trim().is_empty())
                .unwrap_or_else(|| "operator".to_string());
            run.approved_by = Some(approver.clone());
            run.approved_at = Some(Utc::now());
            if let Some(bp) = run.blueprint.as_mut() {
                bp.approved_by = Some(approver);
            }
            if run.transition(RunStatus::Approved).is_err() {
                continue;
            }

            let run = match self.store.update(run).await {
                Ok(stored) => stored,
                Err(e) if e.is_conflict() => continue,
                Err(e) => return Err(e.into()),
            };

            info!(run_id = %run.id, approved_by = ?run.approved_by, "Blueprint approved");
            return self.begin_dispatch(run).await;
        }
    }

    /// Re-dispatch a run whose delivery failed after approval.
    ///
    /// This is a fresh approval attempt: it records a new approval
    /// timestamp, which yields a new idempotency key. Runs that failed
    /// during generation (no blueprint) are not eligible; neither is
    /// re-approval of a completed run.
    pub async fn redispatch(self: &Arc<Self>, run_id: &RunId) -> CoordinatorResult<RunStatus> {
        loop {
            let mut run = self.get(run_id).await?;
            if run.status == RunStatus::Dispatching {
                return Ok(run.status);
            }
            let eligible = run.status == RunStatus::Failed
                && run.blueprint.is_some()
                && run.approved_at.is_some();
            if !eligible {
                return Err(CoordinatorError::InvalidState {
                    run_id: run_id.clone(),
                    status: run.status,
                    action: "redispatch",
                });
            }

            run.approved_at = Some(Utc::now());
            run.production_job_id = None;
            match self.begin_dispatch(run).await {
                Ok(status) => return Ok(status),
                Err(CoordinatorError::Store(e)) if e.is_conflict() => continue,
                other => return other,
            }
        }
    }

    // ------------------------------------------------------------------
    // Pipeline driver
    // ------------------------------------------------------------------

    async fn drive(self: Arc<Self>, run_id: RunId) {
        if let Err(e) = self.drive_inner(&run_id).await {
            match e {
                // A version race or illegal transition means another
                // writer (reaper) decided this run's fate already.
                CoordinatorError::InvalidState { .. } => {
                    info!(run_id = %run_id, "Pipeline superseded: {e}")
                }
                _ => error!(run_id = %run_id, "Pipeline aborted: {e}"),
            }
        }
    }

    async fn drive_inner(&self, run_id: &RunId) -> CoordinatorResult<()> {
        let run = self
            .apply(run_id, |r| r.transition(RunStatus::ExtractingIntent))
            .await?;

        let intent = match self
            .run_stage(run_id, "intent extraction", || {
                self.intent.run(&run.raw_input, &run.model_selector)
            })
            .await
        {
            Ok(out) => out,
            Err(failure) => return self.finish_with_failure(run_id, failure).await,
        };

        let run = self
            .apply(run_id, |r| {
                r.intent = Some(intent.clone());
                r.transition(RunStatus::FormulatingSeo)
            })
            .await?;

        let strategy = match self
            .run_stage(run_id, "SEO strategy", || {
                self.strategy.run(&intent, &run.model_selector)
            })
            .await
        {
            Ok(out) => out,
            Err(failure) => return self.finish_with_failure(run_id, failure).await,
        };

        let run = self
            .apply(run_id, |r| {
                r.strategy = Some(strategy.clone());
                r.seo_mode = Some(strategy.seo_mode);
                r.seo_mode_reason = Some(strategy.seo_mode_reason.clone());
                r.transition(RunStatus::Clustering)
            })
            .await?;

        let blueprint = match self
            .run_stage(run_id, "topic cluster", || {
                self.cluster
                    .run(run_id.as_str(), &run.model_selector, &intent, &strategy)
            })
            .await
        {
            Ok(out) => out,
            Err(failure) => return self.finish_with_failure(run_id, failure).await,
        };

        self.apply(run_id, |r| {
            r.blueprint = Some(blueprint.clone());
            r.transition(RunStatus::AwaitingReview)
        })
        .await?;

        info!(run_id = %run_id, "Blueprint generated, awaiting human review");
        Ok(())
    }

    /// Execute one stage with the retry policy.
    ///
    /// Rejections and fatal faults return immediately. A schema-validation
    /// failure gets one immediate retry with the same input; after that it
    /// consumes the provider retry budget like any transient fault, with
    /// exponential backoff between attempts. The last error text survives
    /// verbatim into the failure message.
    async fn run_stage<T, F, Fut>(
        &self,
        run_id: &RunId,
        stage: &'static str,
        op: F,
    ) -> Result<T, StageFailure>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, StageError>>,
    {
        let max_attempts = self.config.max_stage_attempts.max(1);
        let mut attempts = 0u32;
        let mut validation_retry_used = false;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(StageError::Rejected { reason }) => {
                    return Err(StageFailure::Rejected(reason))
                }
                Err(StageError::Fatal { message }) => {
                    return Err(StageFailure::Failed(format!("{stage} failed: {message}")))
                }
                Err(StageError::Validation { message }) if !validation_retry_used => {
                    validation_retry_used = true;
                    warn!(
                        run_id = %run_id,
                        stage,
                        "Schema validation failed, retrying once: {message}"
                    );
                }
                Err(StageError::Validation { message }) | Err(StageError::Provider { message }) => {
                    attempts += 1;
                    if attempts >= max_attempts {
                        return Err(StageFailure::Failed(format!(
                            "{stage} failed after {attempts} attempts: {message}"
                        )));
                    }
                    let delay = self.config.stage_delay_for_attempt(attempts - 1);
                    warn!(
                        run_id = %run_id,
                        stage,
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Stage attempt failed, retrying: {message}"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn finish_with_failure(
        &self,
        run_id: &RunId,
        failure: StageFailure,
    ) -> CoordinatorResult<()> {
        match failure {
            StageFailure::Rejected(reason) => {
                warn!(run_id = %run_id, "Input rejected: {reason}");
                self.apply(run_id, |r| r.reject(reason.clone())).await?;
            }
            StageFailure::Failed(message) => {
                error!(run_id = %run_id, "Run failed: {message}");
                self.apply(run_id, |r| r.fail(message.clone())).await?;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    /// Enter `dispatching` and hand delivery to a background task.
    ///
    /// `run` must carry a blueprint and a fresh `approved_at`; the
    /// idempotency key derives from them and stays fixed for every retry
    /// of this approval attempt.
    async fn begin_dispatch(self: &Arc<Self>, mut run: Run) -> CoordinatorResult<RunStatus> {
        let Some(blueprint) = run.blueprint.clone() else {
            return Err(CoordinatorError::InvalidState {
                run_id: run.id,
                status: run.status,
                action: "dispatch",
            });
        };

        let approved_at = run.approved_at.unwrap_or_else(Utc::now);
        let correlation_id = run
            .correlation_id
            .clone()
            .unwrap_or_else(|| generate_correlation_id(run.id.as_str(), &blueprint.blueprint_id));
        let idempotency_key = generate_idempotency_key(&blueprint.blueprint_id, approved_at);

        run.correlation_id = Some(correlation_id.clone());
        run.idempotency_key = Some(idempotency_key.clone());
        run.error = None;
        run.transition(RunStatus::Dispatching)
            .map_err(|e: InvalidTransition| CoordinatorError::InvalidState {
                run_id: run.id.clone(),
                status: e.from,
                action: "dispatch",
            })?;

        let stored = self.store.update(run).await.map_err(CoordinatorError::from)?;

        let this = Arc::clone(self);
        let run_id = stored.id.clone();
        tokio::spawn(async move {
            this.deliver_and_finalize(run_id, blueprint, correlation_id, idempotency_key)
                .await;
        });

        Ok(RunStatus::Dispatching)
    }

    async fn deliver_and_finalize(
        &self,
        run_id: RunId,
        blueprint: Blueprint,
        correlation_id: String,
        idempotency_key: String,
    ) {
        let result = self
            .dispatcher
            .deliver(&blueprint, &correlation_id, &idempotency_key)
            .await;

        loop {
            let mut run = match self.store.get(&run_id).await {
                Ok(r) => r,
                Err(e) => {
                    error!(run_id = %run_id, "Cannot record dispatch outcome: {e}");
                    return;
                }
            };

            if run.status != RunStatus::Dispatching {
                // The reaper (or another writer) resolved this run while
                // delivery was in flight; its word stands.
                warn!(
                    run_id = %run_id,
                    status = %run.status,
                    "Run left dispatching during delivery, keeping stored state"
                );
                return;
            }

            let transitioned = match &result {
                Ok(ack) => {
                    run.dispatch_attempts += ack.attempts;
                    run.production_job_id = ack.production_job_id.clone();
                    run.transition(RunStatus::Completed)
                }
                Err(e) => {
                    run.dispatch_attempts += match e {
                        DispatchError::Exhausted { attempts, .. } => *attempts,
                        _ => 1,
                    };
                    run.fail(e.to_string())
                }
            };
            if transitioned.is_err() {
                return;
            }

            match self.store.update(run).await {
                Ok(stored) => {
                    match stored.status {
                        RunStatus::Completed => info!(
                            run_id = %run_id,
                            job_id = ?stored.production_job_id,
                            attempts = stored.dispatch_attempts,
                            "Blueprint dispatched to production"
                        ),
                        _ => error!(
                            run_id = %run_id,
                            error = ?stored.error,
                            "Dispatch failed"
                        ),
                    }
                    return;
                }
                Err(e) if e.is_conflict() => continue,
                Err(e) => {
                    error!(run_id = %run_id, "Cannot record dispatch outcome: {e}");
                    return;
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Store helpers
    // ------------------------------------------------------------------

    async fn get(&self, run_id: &RunId) -> CoordinatorResult<Run> {
        Ok(self.store.get(run_id).await?)
    }

    /// Versioned read-modify-write. Retries on version races; an illegal
    /// transition after a re-read means another writer resolved the run,
    /// and surfaces as `InvalidState` so the caller can stand down.
    async fn apply<F>(&self, run_id: &RunId, mutate: F) -> CoordinatorResult<Run>
    where
        F: Fn(&mut Run) -> Result<(), InvalidTransition>,
    {
        loop {
            let mut run = self.store.get(run_id).await?;
            mutate(&mut run).map_err(|e| CoordinatorError::InvalidState {
                run_id: run_id.clone(),
                status: e.from,
                action: "advance",
            })?;
            match self.store.update(run).await {
                Ok(stored) => return Ok(stored),
                Err(e) if e.is_conflict() => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}
