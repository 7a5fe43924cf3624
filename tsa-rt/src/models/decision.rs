//! Retraining trigger decision

use serde::{Deserialize, Serialize};

/// Why a cycle did (or did not) retrain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrainReason {
    /// Unused pool reached `min_samples_for_retrain`
    EnoughNewSamples,
    /// `retrain_interval_hours` elapsed since the last registered model
    IntervalElapsed,
    /// Operator bypassed the trigger
    Forced,
    NotNeeded,
}

impl RetrainReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrainReason::EnoughNewSamples => "enough_new_samples",
            RetrainReason::IntervalElapsed => "interval_elapsed",
            RetrainReason::Forced => "forced",
            RetrainReason::NotNeeded => "not_needed",
        }
    }
}

impl std::fmt::Display for RetrainReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the trigger check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrainingDecision {
    pub should_retrain: bool,
    pub reason: RetrainReason,
}

impl RetrainingDecision {
    pub fn retrain(reason: RetrainReason) -> Self {
        Self {
            should_retrain: true,
            reason,
        }
    }

    pub fn skip() -> Self {
        Self {
            should_retrain: false,
            reason: RetrainReason::NotNeeded,
        }
    }
}

/// Inputs the trigger was evaluated on
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoolStatus {
    pub unused_samples: u64,
    /// `None` when no model has ever been registered
    pub hours_since_last_train: Option<f64>,
}
