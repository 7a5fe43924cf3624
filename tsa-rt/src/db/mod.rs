//! Retraining persistence
//!
//! [`RetrainStore`] is the seam between the orchestrator and storage.
//! [`SqliteStore`] is the production implementation.

pub mod store;
pub mod versions;

pub use store::{RetrainStore, SqliteStore};
pub use versions::NewModelVersion;
