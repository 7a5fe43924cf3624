//! # TSA Common Library
//!
//! Shared code for the sentiment analysis services:
//! - Domain models (training samples, raw posts, model versions, label codec)
//! - Database initialization and schema
//! - Event types (TsaEvent enum) and EventBus
//! - Configuration loading
//! - SSE helpers

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod models;
pub mod sse;

pub use error::{Error, Result};
pub use models::Sentiment;
