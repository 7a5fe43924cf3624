//! Labeled sample loaders
//!
//! Two sources feed the training pool: a small curated list and labeled
//! JSONL files in sentiment140 shape, one `{"text", "sentiment": 0|2|4}`
//! object per line. A string `label` field is accepted in place of the
//! polarity code.

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use tsa_common::db::samples;
use tsa_common::models::{NewSample, Sentiment};

use crate::error::Result;

pub const MANUAL_SOURCE: &str = "manual";
pub const SENTIMENT140_SOURCE: &str = "sentiment140";

/// Samples per committed transaction
pub const LOAD_CHUNK_SIZE: usize = 1000;

const CURATED: &[(&str, Sentiment)] = &[
    ("I absolutely love this product! Best purchase ever!", Sentiment::Positive),
    ("This is amazing! Highly recommend it to everyone.", Sentiment::Positive),
    ("Great quality and fast shipping. Very satisfied!", Sentiment::Positive),
    ("Terrible experience. Would not recommend.", Sentiment::Negative),
    ("Worst product I've ever bought. Complete waste of money.", Sentiment::Negative),
    ("Very disappointed with the quality. Not worth it.", Sentiment::Negative),
    ("It's okay, nothing special but does the job.", Sentiment::Neutral),
    ("Average product, met my expectations.", Sentiment::Neutral),
    ("Not bad, not great. Just okay for the price.", Sentiment::Neutral),
];

/// The built-in curated samples, source `manual`
pub fn curated_samples() -> Vec<NewSample> {
    CURATED
        .iter()
        .map(|(text, label)| NewSample::new(*text, *label, MANUAL_SOURCE))
        .collect()
}

/// One line of a labeled JSONL file
#[derive(Debug, Clone, Deserialize)]
pub struct LabeledRecord {
    pub text: String,
    /// sentiment140 polarity: 0 negative, 2 neutral, 4 positive
    #[serde(default)]
    pub sentiment: Option<i64>,
    #[serde(default)]
    pub label: Option<String>,
}

impl LabeledRecord {
    /// `None` for blank text or a record with neither label form
    pub fn into_sample(self, source: &str) -> Option<NewSample> {
        let text = self.text.trim();
        if text.is_empty() {
            return None;
        }
        let label = match (self.sentiment, self.label.as_deref()) {
            (Some(code), _) => Sentiment::from_sentiment140(code),
            (None, Some(label)) => Sentiment::parse_lenient(label),
            (None, None) => return None,
        };
        Some(NewSample::new(text, label, source))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub source: String,
    pub inserted: u64,
    /// Blank, malformed or unlabeled lines
    pub skipped: usize,
}

pub async fn load_curated(pool: &SqlitePool) -> Result<LoadReport> {
    let inserted = samples::insert_samples(pool, &curated_samples()).await?;
    info!(inserted, "Loaded curated samples");
    Ok(LoadReport {
        source: MANUAL_SOURCE.to_string(),
        inserted,
        skipped: 0,
    })
}

/// Load a labeled JSONL file, committing every [`LOAD_CHUNK_SIZE`] samples
///
/// Stops after `limit` usable samples when given. Chunks committed before a
/// storage failure stay committed.
pub async fn load_labeled_jsonl(
    pool: &SqlitePool,
    path: &Path,
    source: &str,
    limit: Option<usize>,
) -> Result<LoadReport> {
    let file = File::open(path).await?;
    let mut lines = BufReader::new(file).lines();

    let limit = limit.unwrap_or(usize::MAX);
    let mut chunk: Vec<NewSample> = Vec::with_capacity(LOAD_CHUNK_SIZE);
    let mut accepted = 0usize;
    let mut inserted = 0u64;
    let mut skipped = 0usize;
    let mut line_no = 0usize;

    while accepted < limit {
        let Some(line) = lines.next_line().await? else {
            break;
        };
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }

        let sample = match serde_json::from_str::<LabeledRecord>(&line) {
            Ok(record) => record.into_sample(source),
            Err(e) => {
                warn!(line = line_no, error = %e, "Skipping malformed record");
                None
            }
        };
        let Some(sample) = sample else {
            skipped += 1;
            continue;
        };

        chunk.push(sample);
        accepted += 1;
        if chunk.len() >= LOAD_CHUNK_SIZE {
            inserted += samples::insert_samples(pool, &chunk).await?;
            chunk.clear();
            info!(inserted, path = %path.display(), "Loaded samples...");
        }
    }

    if !chunk.is_empty() {
        inserted += samples::insert_samples(pool, &chunk).await?;
    }

    info!(inserted, skipped, source, path = %path.display(), "Finished loading labeled file");
    Ok(LoadReport {
        source: source.to_string(),
        inserted,
        skipped,
    })
}
