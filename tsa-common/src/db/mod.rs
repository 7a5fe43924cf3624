//! Shared SQLite database access
//!
//! Schema creation plus the training sample queries used by both the
//! retraining and ingestion services.

pub mod init;
pub mod retry;
pub mod samples;

pub use init::{create_schema, init_database, init_memory_database};
pub use retry::{retry_on_lock, MAX_LOCK_WAIT_MS};
