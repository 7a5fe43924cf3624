//! Registered model versions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Classification quality measured on a held-out split
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub accuracy: f64,
    /// Macro-averaged over classes
    pub f1: f64,
    pub precision: f64,
    pub recall: f64,
    /// Samples the metrics were computed over
    pub sample_count: u64,
}

/// One row of the model registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVersion {
    /// Monotonic, assigned at registration
    pub version: i64,
    pub model_path: String,
    /// Test-split metrics
    pub metrics: ModelMetrics,
    pub validation_metrics: ModelMetrics,
    /// Pool size consumed by the cycle that produced this model
    pub sample_count: u64,
    pub trained_at: DateTime<Utc>,
    pub is_deployed: bool,
    pub training_batch_id: Uuid,
}
