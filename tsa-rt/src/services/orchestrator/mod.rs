//! Retraining orchestrator
//!
//! Runs one retraining cycle through its phases:
//! IDLE → CHECKING → FETCHING → SPLITTING → TRAINING → EVALUATING →
//! REGISTERING → PROMOTING → DONE
//!
//! - **CHECKING / FETCHING / SPLITTING** (`phase_prepare.rs`): trigger,
//!   pool snapshot, stratified split
//! - **TRAINING / EVALUATING** (`phase_training.rs`): fit on the blocking
//!   pool, score the held-out test split
//! - **REGISTERING / PROMOTING** (`phase_commit.rs`): version row, sample
//!   marking, promotion policy
//!
//! At most one cycle runs at a time. A wall-clock budget is checked before
//! every phase up to REGISTERING and while awaiting blocking work; the
//! commit phases always run to completion.

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use tsa_common::config::RetrainConfig;
use tsa_common::events::{EventBus, TsaEvent};

use crate::db::RetrainStore;
use crate::error::{CycleError, RetrainError};
use crate::models::{CycleOutcome, CyclePhase, CycleRun, PoolStatus, RetrainingDecision};
use crate::services::promotion::{policy_from_config, PromotionPolicy};
use crate::services::registry::ModelRegistry;
use crate::services::splitter::DatasetSplitter;
use crate::services::trainer::Trainer;
use crate::services::trigger;

mod phase_commit;
mod phase_prepare;
mod phase_training;

/// Wall-clock budget of a cycle
#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Deadline {
    fn check(deadline: Option<Deadline>) -> Result<(), RetrainError> {
        match deadline {
            Some(d) if Instant::now() >= d.at => Err(RetrainError::Timeout(d.budget)),
            _ => Ok(()),
        }
    }
}

pub struct RetrainingOrchestrator {
    store: Arc<dyn RetrainStore>,
    registry: ModelRegistry,
    trainer: Arc<dyn Trainer>,
    policy: Box<dyn PromotionPolicy>,
    splitter: DatasetSplitter,
    config: RetrainConfig,
    model_dir: PathBuf,
    event_bus: EventBus,
    cycle_lock: Mutex<()>,
}

impl RetrainingOrchestrator {
    /// Build an orchestrator from the retraining section of the config
    ///
    /// Fails with [`RetrainError::Config`] on invalid split fractions.
    pub fn new(
        store: Arc<dyn RetrainStore>,
        trainer: Arc<dyn Trainer>,
        config: RetrainConfig,
        model_dir: PathBuf,
        event_bus: EventBus,
    ) -> Result<Self, RetrainError> {
        let splitter = DatasetSplitter::new(config.test_fraction, config.val_fraction, config.seed)?;
        let policy = policy_from_config(&config.promotion);
        let registry = ModelRegistry::new(Arc::clone(&store), event_bus.clone());

        Ok(Self {
            store,
            registry,
            trainer,
            policy,
            splitter,
            config,
            model_dir,
            event_bus,
            cycle_lock: Mutex::new(()),
        })
    }

    /// Replace the promotion policy chosen from config
    pub fn with_policy(mut self, policy: Box<dyn PromotionPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn trainer(&self) -> Arc<dyn Trainer> {
        Arc::clone(&self.trainer)
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    /// Whether a cycle currently holds the guard
    pub fn is_running(&self) -> bool {
        self.cycle_lock.try_lock().is_err()
    }

    /// Unused pool size and hours since the newest version
    pub async fn pool_status(&self) -> Result<PoolStatus, RetrainError> {
        let unused_samples = self.store.count_unused_samples().await?;
        let hours_since_last_train = self
            .store
            .time_since_last_version()
            .await?
            .map(|elapsed| elapsed.num_milliseconds().max(0) as f64 / 3_600_000.0);
        Ok(PoolStatus {
            unused_samples,
            hours_since_last_train,
        })
    }

    /// Evaluate the trigger without side effects
    pub async fn check_retraining_needed(&self) -> Result<RetrainingDecision, RetrainError> {
        let status = self.pool_status().await?;
        Ok(self.decide(&status))
    }

    fn decide(&self, status: &PoolStatus) -> RetrainingDecision {
        trigger::evaluate(
            status,
            self.config.min_samples_for_retrain,
            self.config.retrain_interval_hours,
        )
    }

    /// Run one cycle
    ///
    /// `Ok(None)` means the trigger said retraining was not needed.
    pub async fn run_retraining_cycle(
        &self,
        force: bool,
    ) -> Result<Option<CycleOutcome>, CycleError> {
        self.run_cycle(force, None).await
    }

    /// Run one cycle within a wall-clock budget
    ///
    /// Exceeding the budget before REGISTERING abandons the cycle with
    /// [`RetrainError::Timeout`]; nothing is registered or promoted.
    pub async fn run_retraining_cycle_with_timeout(
        &self,
        force: bool,
        timeout: Duration,
    ) -> Result<Option<CycleOutcome>, CycleError> {
        let deadline = Deadline {
            at: Instant::now() + timeout,
            budget: timeout,
        };
        self.run_cycle(force, Some(deadline)).await
    }

    async fn run_cycle(
        &self,
        force: bool,
        deadline: Option<Deadline>,
    ) -> Result<Option<CycleOutcome>, CycleError> {
        let Ok(_guard) = self.cycle_lock.try_lock() else {
            warn!(force, "Retraining cycle refused: another cycle is in progress");
            return Err(CycleError {
                cycle_id: Uuid::nil(),
                phase: CyclePhase::Idle,
                elapsed: Duration::ZERO,
                source: RetrainError::CycleInProgress,
            });
        };

        let started = Instant::now();
        let mut run = CycleRun::new(force);

        match self.execute(&mut run, started, deadline).await {
            Ok(outcome) => Ok(outcome),
            Err(source) => {
                let phase = run.phase;
                let elapsed = started.elapsed();
                let transition = run.fail(source.to_string());
                self.cleanup_unregistered_model(&run);

                error!(
                    cycle_id = %run.cycle_id,
                    phase = ?phase,
                    forced = run.forced,
                    decision = ?run.decision,
                    elapsed_ms = elapsed.as_millis() as u64,
                    error = %source,
                    "Retraining cycle failed"
                );
                self.publish_transition(&transition.old_phase, &transition.new_phase, run.cycle_id);
                self.event_bus.emit_lossy(TsaEvent::RetrainCycleFailed {
                    cycle_id: run.cycle_id,
                    phase: phase.as_str().to_string(),
                    error: source.to_string(),
                    timestamp: Utc::now(),
                });

                Err(CycleError {
                    cycle_id: run.cycle_id,
                    phase,
                    elapsed,
                    source,
                })
            }
        }
    }

    async fn execute(
        &self,
        run: &mut CycleRun,
        started: Instant,
        deadline: Option<Deadline>,
    ) -> Result<Option<CycleOutcome>, RetrainError> {
        let Some(reason) = self.phase_checking(run, deadline).await? else {
            return Ok(None);
        };
        let (ids, split) = self.phase_fetch_and_split(run, deadline).await?;
        let trained = self.phase_training(run, &split, deadline).await?;
        let test_metrics = self.phase_evaluating(run, &trained, &split, deadline).await?;
        let (version, promoted, promotion_note) = self
            .phase_commit(run, &trained, test_metrics, &ids, deadline)
            .await?;

        self.transition(run, CyclePhase::Done);
        let duration_ms = started.elapsed().as_millis() as u64;

        info!(
            cycle_id = %run.cycle_id,
            version = version.version,
            promoted,
            samples = ids.len(),
            test_f1 = version.metrics.f1,
            test_accuracy = version.metrics.accuracy,
            duration_ms,
            "Retraining cycle completed"
        );
        self.event_bus.emit_lossy(TsaEvent::RetrainCycleCompleted {
            cycle_id: run.cycle_id,
            version: version.version,
            promoted,
            metrics: version.metrics,
            duration_ms,
            timestamp: Utc::now(),
        });

        Ok(Some(CycleOutcome {
            cycle_id: run.cycle_id,
            batch_id: run.batch_id,
            version,
            promoted,
            reason,
            promotion_note,
            train_size: split.train.len(),
            val_size: split.val.len(),
            test_size: split.test.len(),
            duration_ms,
        }))
    }

    /// Check the budget, then move to `phase`
    fn enter(
        &self,
        run: &mut CycleRun,
        phase: CyclePhase,
        deadline: Option<Deadline>,
    ) -> Result<(), RetrainError> {
        Deadline::check(deadline)?;
        self.transition(run, phase);
        Ok(())
    }

    fn transition(&self, run: &mut CycleRun, phase: CyclePhase) {
        let transition = run.transition_to(phase);
        debug!(
            cycle_id = %run.cycle_id,
            old_phase = ?transition.old_phase,
            new_phase = ?transition.new_phase,
            "Cycle phase changed"
        );
        self.publish_transition(&transition.old_phase, &transition.new_phase, run.cycle_id);
    }

    fn publish_transition(&self, old: &CyclePhase, new: &CyclePhase, cycle_id: Uuid) {
        self.event_bus.emit_lossy(TsaEvent::RetrainPhaseChanged {
            cycle_id,
            old_phase: old.as_str().to_string(),
            new_phase: new.as_str().to_string(),
            timestamp: Utc::now(),
        });
    }

    fn model_path(&self, batch_id: Uuid) -> PathBuf {
        self.model_dir.join(format!("sentiment-{}.json", batch_id))
    }

    /// Remove a model file whose version row was never written
    fn cleanup_unregistered_model(&self, run: &CycleRun) {
        if run.registered_version.is_some() {
            return;
        }
        remove_model_file(&self.model_path(run.batch_id));
    }
}

/// Delete a model file; a file that is already gone is fine
fn remove_model_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "Removed unregistered model file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to remove unregistered model file")
        }
    }
}
