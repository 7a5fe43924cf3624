//! TRAINING and EVALUATING phases
//!
//! Both run on the blocking pool. A deadline abandons the await, not the
//! thread; an abandoned fit finishes in the background, deletes the model
//! file it wrote and its result is dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

use tsa_common::models::ModelMetrics;

use super::{remove_model_file, Deadline, RetrainingOrchestrator};
use crate::error::RetrainError;
use crate::models::{CyclePhase, CycleRun};
use crate::services::splitter::DatasetSplit;
use crate::services::trainer::{check_metrics, evaluate, TrainedModel};

async fn await_blocking<T>(
    handle: JoinHandle<Result<T, RetrainError>>,
    deadline: Option<Deadline>,
    what: &str,
) -> Result<T, RetrainError> {
    let joined = match deadline {
        Some(d) => tokio::time::timeout_at(d.at, handle)
            .await
            .map_err(|_| RetrainError::Timeout(d.budget))?,
        None => handle.await,
    };
    joined.map_err(|e| RetrainError::TrainingFailure(format!("{} task failed: {}", what, e)))?
}

impl RetrainingOrchestrator {
    pub(super) async fn phase_training(
        &self,
        run: &mut CycleRun,
        split: &DatasetSplit,
        deadline: Option<Deadline>,
    ) -> Result<TrainedModel, RetrainError> {
        self.enter(run, CyclePhase::Training, deadline)?;

        let trainer = Arc::clone(&self.trainer);
        let train = split.train.clone();
        let val = split.val.clone();
        let model_path = self.model_path(run.batch_id);

        // Raised before the cycle's cleanup runs; checked by the fit after saving
        let abandoned = Arc::new(AtomicBool::new(false));
        let fit_abandoned = Arc::clone(&abandoned);

        let handle = tokio::task::spawn_blocking(move || {
            let result = trainer.train(&train, &val, &model_path);
            if fit_abandoned.load(Ordering::SeqCst) {
                remove_model_file(&model_path);
            }
            result
        });
        let trained = match await_blocking(handle, deadline, "training").await {
            Ok(trained) => trained,
            Err(e) => {
                abandoned.store(true, Ordering::SeqCst);
                return Err(e);
            }
        };

        info!(
            cycle_id = %run.cycle_id,
            epochs = trained.report.epochs,
            final_loss = trained.report.final_loss,
            val_f1 = trained.report.validation.f1,
            "Training finished"
        );
        Ok(trained)
    }

    /// Score the held-out test split
    pub(super) async fn phase_evaluating(
        &self,
        run: &mut CycleRun,
        trained: &TrainedModel,
        split: &DatasetSplit,
        deadline: Option<Deadline>,
    ) -> Result<ModelMetrics, RetrainError> {
        self.enter(run, CyclePhase::Evaluating, deadline)?;

        let model = Arc::clone(&trained.model);
        let test = split.test.clone();
        let handle = tokio::task::spawn_blocking(move || {
            let metrics = evaluate(model.as_ref(), &test);
            check_metrics(&metrics, "test")?;
            Ok(metrics)
        });
        let metrics = await_blocking(handle, deadline, "evaluation").await?;

        info!(
            cycle_id = %run.cycle_id,
            accuracy = metrics.accuracy,
            f1 = metrics.f1,
            precision = metrics.precision,
            recall = metrics.recall,
            "Evaluated model on test split"
        );
        Ok(metrics)
    }
}
