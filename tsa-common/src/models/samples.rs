//! Labeled training samples and raw captured posts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Sentiment;

/// Labeled text available for training
///
/// Once `used_for_training` is set the sample is never fetched again unless
/// its batch is explicitly reset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSample {
    pub id: i64,
    pub text: String,
    pub label: Sentiment,
    /// Where the sample came from (e.g. "manual", "sentiment140")
    pub source: String,
    pub used_for_training: bool,
    pub created_at: DateTime<Utc>,
    /// Cycle that consumed this sample
    pub training_batch_id: Option<Uuid>,
}

/// Sample to be inserted (id and timestamps assigned by storage)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSample {
    pub text: String,
    pub label: Sentiment,
    pub source: String,
}

impl NewSample {
    pub fn new(text: impl Into<String>, label: Sentiment, source: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            label,
            source: source.into(),
        }
    }
}

/// Unlabeled post captured from the ingestion stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPost {
    #[serde(alias = "id", alias = "tweet_id")]
    pub post_id: String,
    pub text: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub author_id: Option<String>,
    #[serde(default)]
    pub lang: Option<String>,
}
