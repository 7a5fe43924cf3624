//! # tsa-in
//!
//! Ingestion side of the sentiment services. Captures raw posts matching a
//! keyword rule set into the database through a bounded batching consumer,
//! and loads labeled training samples from curated lists or JSONL files.

pub mod batcher;
pub mod db;
pub mod error;
pub mod loader;
pub mod rules;

pub use batcher::{BatchPolicy, BatcherStats, LogOnlySink, PostBatcher, PostSink, SqlitePostSink};
pub use error::{IngestError, Result};
pub use loader::{LabeledRecord, LoadReport};
pub use rules::{RuleSet, StreamRule};
