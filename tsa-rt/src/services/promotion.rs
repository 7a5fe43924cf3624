//! Promotion policies
//!
//! Decide whether a freshly registered version replaces the deployed one.
//! The registry only enforces the single-deployed invariant; the decision
//! lives here.

use tsa_common::config::{PromotionMetric, PromotionMode};
use tsa_common::models::ModelVersion;

/// Result of a policy check
#[derive(Debug, Clone, PartialEq)]
pub struct PromotionVerdict {
    pub promote: bool,
    pub reason: String,
}

impl PromotionVerdict {
    fn yes(reason: impl Into<String>) -> Self {
        Self {
            promote: true,
            reason: reason.into(),
        }
    }

    fn no(reason: impl Into<String>) -> Self {
        Self {
            promote: false,
            reason: reason.into(),
        }
    }
}

pub trait PromotionPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    fn should_promote(
        &self,
        candidate: &ModelVersion,
        deployed: Option<&ModelVersion>,
    ) -> PromotionVerdict;
}

/// Every successfully trained model is deployed
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysPromote;

impl PromotionPolicy for AlwaysPromote {
    fn name(&self) -> &'static str {
        "always"
    }

    fn should_promote(&self, _: &ModelVersion, _: Option<&ModelVersion>) -> PromotionVerdict {
        PromotionVerdict::yes("unconditional promotion")
    }
}

/// Deploy only if the candidate beats the deployed model on the test split
#[derive(Debug, Clone, Copy)]
pub struct PromoteIfImproved {
    pub metric: PromotionMetric,
    pub min_delta: f64,
}

impl PromoteIfImproved {
    fn score(&self, version: &ModelVersion) -> f64 {
        match self.metric {
            PromotionMetric::F1 => version.metrics.f1,
            PromotionMetric::Accuracy => version.metrics.accuracy,
        }
    }
}

impl PromotionPolicy for PromoteIfImproved {
    fn name(&self) -> &'static str {
        "if_improved"
    }

    fn should_promote(
        &self,
        candidate: &ModelVersion,
        deployed: Option<&ModelVersion>,
    ) -> PromotionVerdict {
        let Some(deployed) = deployed else {
            return PromotionVerdict::yes("no deployed model");
        };
        let new = self.score(candidate);
        let old = self.score(deployed);
        let reason = format!(
            "{:?} {:.4} vs deployed v{} {:.4} (min delta {})",
            self.metric, new, deployed.version, old, self.min_delta
        );
        if new - old >= self.min_delta {
            PromotionVerdict::yes(reason)
        } else {
            PromotionVerdict::no(reason)
        }
    }
}

pub fn policy_from_config(mode: &PromotionMode) -> Box<dyn PromotionPolicy> {
    match mode {
        PromotionMode::Always => Box::new(AlwaysPromote),
        PromotionMode::IfImproved { metric, min_delta } => Box::new(PromoteIfImproved {
            metric: *metric,
            min_delta: *min_delta,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tsa_common::models::ModelMetrics;
    use uuid::Uuid;

    fn version(v: i64, f1: f64, accuracy: f64) -> ModelVersion {
        ModelVersion {
            version: v,
            model_path: format!("m{}.json", v),
            metrics: ModelMetrics {
                accuracy,
                f1,
                precision: f1,
                recall: f1,
                sample_count: 100,
            },
            validation_metrics: ModelMetrics::default(),
            sample_count: 500,
            trained_at: Utc::now(),
            is_deployed: false,
            training_batch_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn always_promotes_even_when_worse() {
        let verdict = AlwaysPromote.should_promote(&version(2, 0.1, 0.1), Some(&version(1, 0.9, 0.9)));
        assert!(verdict.promote);
    }

    #[test]
    fn if_improved_promotes_first_model() {
        let policy = PromoteIfImproved {
            metric: PromotionMetric::F1,
            min_delta: 0.5,
        };
        assert!(policy.should_promote(&version(1, 0.2, 0.2), None).promote);
    }

    #[test]
    fn if_improved_compares_configured_metric() {
        let policy = PromoteIfImproved {
            metric: PromotionMetric::Accuracy,
            min_delta: 0.01,
        };
        let deployed = version(1, 0.9, 0.70);
        assert!(policy.should_promote(&version(2, 0.5, 0.72), Some(&deployed)).promote);
        assert!(!policy.should_promote(&version(3, 0.99, 0.705), Some(&deployed)).promote);
    }

    #[test]
    fn config_selects_policy() {
        assert_eq!(policy_from_config(&PromotionMode::Always).name(), "always");
        let mode = PromotionMode::IfImproved {
            metric: PromotionMetric::F1,
            min_delta: 0.0,
        };
        assert_eq!(policy_from_config(&mode).name(), "if_improved");
    }
}
