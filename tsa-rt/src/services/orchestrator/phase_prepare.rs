//! CHECKING, FETCHING and SPLITTING phases

use chrono::Utc;
use tracing::info;

use tsa_common::events::TsaEvent;

use super::{Deadline, RetrainingOrchestrator};
use crate::error::RetrainError;
use crate::models::{CyclePhase, CycleRun, RetrainReason, RetrainingDecision};
use crate::services::splitter::DatasetSplit;

impl RetrainingOrchestrator {
    /// Evaluate the trigger; `None` ends the cycle as SKIPPED
    pub(super) async fn phase_checking(
        &self,
        run: &mut CycleRun,
        deadline: Option<Deadline>,
    ) -> Result<Option<RetrainReason>, RetrainError> {
        self.enter(run, CyclePhase::Checking, deadline)?;

        let status = self.pool_status().await?;
        let decision = if run.forced {
            RetrainingDecision::retrain(RetrainReason::Forced)
        } else {
            self.decide(&status)
        };
        run.decision = Some(decision);

        if !decision.should_retrain {
            self.transition(run, CyclePhase::Skipped);
            info!(
                cycle_id = %run.cycle_id,
                unused_samples = status.unused_samples,
                hours_since_last_train = ?status.hours_since_last_train,
                "Retraining not needed"
            );
            self.event_bus.emit_lossy(TsaEvent::RetrainCycleSkipped {
                cycle_id: run.cycle_id,
                unused_samples: status.unused_samples,
                timestamp: Utc::now(),
            });
            return Ok(None);
        }

        info!(
            cycle_id = %run.cycle_id,
            reason = %decision.reason,
            unused_samples = status.unused_samples,
            batch_id = %run.batch_id,
            "Starting retraining cycle"
        );
        self.event_bus.emit_lossy(TsaEvent::RetrainCycleStarted {
            cycle_id: run.cycle_id,
            forced: run.forced,
            reason: decision.reason.to_string(),
            timestamp: Utc::now(),
        });
        Ok(Some(decision.reason))
    }

    /// Snapshot the unused pool and split it
    ///
    /// Returns the snapshot ids; exactly these are marked used on commit.
    pub(super) async fn phase_fetch_and_split(
        &self,
        run: &mut CycleRun,
        deadline: Option<Deadline>,
    ) -> Result<(Vec<i64>, DatasetSplit), RetrainError> {
        self.enter(run, CyclePhase::Fetching, deadline)?;

        let pool = self
            .store
            .fetch_unused_samples(self.config.max_pool_samples)
            .await?;
        if pool.len() < self.config.min_pool_size {
            return Err(RetrainError::InsufficientData(format!(
                "pool has {} unused samples, need at least {}",
                pool.len(),
                self.config.min_pool_size
            )));
        }
        let ids: Vec<i64> = pool.iter().map(|s| s.id).collect();
        info!(cycle_id = %run.cycle_id, samples = ids.len(), "Fetched training pool");

        self.enter(run, CyclePhase::Splitting, deadline)?;
        let split = self.splitter.split(pool)?;
        info!(
            cycle_id = %run.cycle_id,
            train = split.train.len(),
            val = split.val.len(),
            test = split.test.len(),
            "Split training pool"
        );

        Ok((ids, split))
    }
}
