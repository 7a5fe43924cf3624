//! Model training capability
//!
//! The orchestrator only sees [`Trainer`] and [`SentimentModel`]; the
//! numeric implementation behind them is replaceable.

pub mod bow;
pub mod metrics;
pub mod tokenize;

pub use bow::{BowLogRegModel, BowTrainer};
pub use metrics::ConfusionMatrix;

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use tsa_common::models::{ModelMetrics, Sentiment, TrainingSample};

use crate::error::RetrainError;

/// One classified text
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: Sentiment,
    /// Probability of `label`, in [0, 1]
    pub confidence: f64,
}

/// A fitted classifier
pub trait SentimentModel: Send + Sync {
    /// One prediction per input text, in order
    fn predict(&self, texts: &[String]) -> Vec<Prediction>;
}

/// Summary of one fit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainReport {
    pub validation: ModelMetrics,
    /// Mean cross-entropy over the last epoch
    pub final_loss: f64,
    pub epochs: usize,
    pub train_samples: usize,
}

pub struct TrainedModel {
    pub model: Arc<dyn SentimentModel>,
    pub report: TrainReport,
}

impl std::fmt::Debug for TrainedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrainedModel")
            .field("report", &self.report)
            .finish_non_exhaustive()
    }
}

/// Fits and loads models
///
/// Training is CPU-bound and synchronous; callers run it on the blocking
/// pool. Implementations must be deterministic for a fixed seed and must
/// return [`RetrainError::TrainingFailure`] instead of panicking.
pub trait Trainer: Send + Sync {
    /// Fit on `train`, score on `val`, persist the model at `model_path`
    fn train(
        &self,
        train: &[TrainingSample],
        val: &[TrainingSample],
        model_path: &Path,
    ) -> Result<TrainedModel, RetrainError>;

    fn load(&self, model_path: &Path) -> Result<Arc<dyn SentimentModel>, RetrainError>;
}

/// Score `model` against labeled samples
pub fn evaluate(model: &dyn SentimentModel, samples: &[TrainingSample]) -> ModelMetrics {
    let texts: Vec<String> = samples.iter().map(|s| s.text.clone()).collect();
    let predictions = model.predict(&texts);
    ConfusionMatrix::from_pairs(
        samples
            .iter()
            .zip(predictions)
            .map(|(sample, prediction)| (sample.label, prediction.label)),
    )
    .metrics()
}

/// Metrics usable for registration and promotion
pub(crate) fn check_metrics(metrics: &ModelMetrics, split: &str) -> Result<(), RetrainError> {
    let values = [metrics.accuracy, metrics.f1, metrics.precision, metrics.recall];
    if values.iter().any(|v| !v.is_finite() || *v < 0.0 || *v > 1.0) {
        return Err(RetrainError::TrainingFailure(format!(
            "degenerate {} metrics: {:?}",
            split, metrics
        )));
    }
    if metrics.sample_count == 0 {
        return Err(RetrainError::TrainingFailure(format!(
            "{} metrics computed over zero samples",
            split
        )));
    }
    Ok(())
}
