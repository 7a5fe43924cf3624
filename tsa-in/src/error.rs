//! Error types for tsa-in

use thiserror::Error;

pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Debug, Error)]
pub enum IngestError {
    /// Rule keyword empty or otherwise unusable
    #[error("Invalid stream rule: {0}")]
    InvalidRule(String),

    /// The batching consumer has stopped accepting posts
    #[error("Post batcher is closed")]
    BatcherClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] tsa_common::Error),
}
