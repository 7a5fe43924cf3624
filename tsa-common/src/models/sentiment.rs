//! Sentiment label codec
//!
//! Fixed class indices: negative=0, neutral=1, positive=2.
//!
//! Decoding is total: unknown indices map to [`UNKNOWN_LABEL`] and unknown
//! strings map to neutral, so a single malformed label never aborts a
//! retraining job.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sentinel returned when decoding an index outside the vocabulary
pub const UNKNOWN_LABEL: &str = "unknown";

/// Number of sentiment classes
pub const NUM_CLASSES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Negative,
    Neutral,
    Positive,
}

impl Sentiment {
    pub const ALL: [Sentiment; NUM_CLASSES] =
        [Sentiment::Negative, Sentiment::Neutral, Sentiment::Positive];

    pub fn index(self) -> usize {
        match self {
            Sentiment::Negative => 0,
            Sentiment::Neutral => 1,
            Sentiment::Positive => 2,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Sentiment::Negative => "negative",
            Sentiment::Neutral => "neutral",
            Sentiment::Positive => "positive",
        }
    }

    /// Parse a label, degrading unrecognized values to neutral
    pub fn parse_lenient(label: &str) -> Self {
        label.parse().unwrap_or_else(|_| {
            tracing::warn!(label, "Unrecognized sentiment label, treating as neutral");
            Sentiment::Neutral
        })
    }

    /// Map a sentiment140 polarity code (0, 2, 4) to a label
    pub fn from_sentiment140(code: i64) -> Self {
        match code {
            0 => Sentiment::Negative,
            2 => Sentiment::Neutral,
            4 => Sentiment::Positive,
            _ => Sentiment::Neutral,
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown sentiment label: {0}")]
pub struct UnknownSentiment(pub String);

impl FromStr for Sentiment {
    type Err = UnknownSentiment;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "negative" => Ok(Sentiment::Negative),
            "neutral" => Ok(Sentiment::Neutral),
            "positive" => Ok(Sentiment::Positive),
            _ => Err(UnknownSentiment(s.to_string())),
        }
    }
}

/// Encode a label string as a class index (case-insensitive, neutral fallback)
pub fn sentiment_to_index(label: &str) -> usize {
    Sentiment::parse_lenient(label).index()
}

/// Decode a class index to its label, or [`UNKNOWN_LABEL`] if out of range
pub fn index_to_sentiment(index: i64) -> &'static str {
    usize::try_from(index)
        .ok()
        .and_then(Sentiment::from_index)
        .map(Sentiment::as_str)
        .unwrap_or(UNKNOWN_LABEL)
}
