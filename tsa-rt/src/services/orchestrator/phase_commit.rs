//! REGISTERING and PROMOTING phases
//!
//! Past the deadline check on entering REGISTERING nothing here is
//! cancelled.

use tracing::{error, info};

use tsa_common::models::{ModelMetrics, ModelVersion};

use super::{Deadline, RetrainingOrchestrator};
use crate::error::RetrainError;
use crate::models::{CyclePhase, CycleRun};
use crate::services::trainer::TrainedModel;

impl RetrainingOrchestrator {
    /// Register the version, mark the snapshot used, apply the policy
    ///
    /// Returns the (possibly promoted) version, whether it was promoted and
    /// the policy's reason.
    pub(super) async fn phase_commit(
        &self,
        run: &mut CycleRun,
        trained: &TrainedModel,
        test_metrics: ModelMetrics,
        ids: &[i64],
        deadline: Option<Deadline>,
    ) -> Result<(ModelVersion, bool, String), RetrainError> {
        self.enter(run, CyclePhase::Registering, deadline)?;

        let model_path = self.model_path(run.batch_id).to_string_lossy().into_owned();
        let mut version = self
            .registry
            .register(
                model_path,
                test_metrics,
                trained.report.validation,
                ids.len() as u64,
                run.batch_id,
            )
            .await?;
        run.registered_version = Some(version.version);

        if let Err(e) = self.store.mark_used(run.batch_id, ids).await {
            error!(
                cycle_id = %run.cycle_id,
                version = version.version,
                batch_id = %run.batch_id,
                sample_count = ids.len(),
                error = %e,
                "Model registered but samples could not be marked used; operator reconciliation required"
            );
            return Err(RetrainError::PartialCommit {
                version: version.version,
                batch_id: run.batch_id,
                sample_count: ids.len(),
                reason: e.to_string(),
            });
        }

        self.transition(run, CyclePhase::Promoting);

        let deployed = self.store.get_deployed().await?;
        let verdict = self.policy.should_promote(&version, deployed.as_ref());
        if verdict.promote {
            self.registry.promote(version.version).await?;
            version.is_deployed = true;
        } else {
            info!(
                cycle_id = %run.cycle_id,
                version = version.version,
                policy = self.policy.name(),
                reason = %verdict.reason,
                "Promotion declined"
            );
        }

        Ok((version, verdict.promote, verdict.reason))
    }
}
