//! Retraining trigger
//!
//! Pure go/no-go decision over the state of the data pool. No I/O and no
//! memory of earlier decisions.

use crate::models::{PoolStatus, RetrainReason, RetrainingDecision};

/// Decide whether a new model should be trained
///
/// The sample threshold is checked first, so a pool that satisfies both
/// conditions reports [`RetrainReason::EnoughNewSamples`].
pub fn should_retrain(
    new_sample_count: u64,
    hours_since_last_train: f64,
    min_samples: u64,
    interval_hours: f64,
) -> RetrainingDecision {
    if new_sample_count >= min_samples {
        return RetrainingDecision::retrain(RetrainReason::EnoughNewSamples);
    }
    if hours_since_last_train >= interval_hours {
        return RetrainingDecision::retrain(RetrainReason::IntervalElapsed);
    }
    RetrainingDecision::skip()
}

/// Evaluate the trigger for a pool snapshot
///
/// With no model ever registered the elapsed time counts as infinite, but
/// only when there is something to train on.
pub fn evaluate(status: &PoolStatus, min_samples: u64, interval_hours: f64) -> RetrainingDecision {
    let hours = match status.hours_since_last_train {
        Some(hours) => hours,
        None if status.unused_samples > 0 => f64::INFINITY,
        None => 0.0,
    };
    should_retrain(status.unused_samples, hours, min_samples, interval_hours)
}
