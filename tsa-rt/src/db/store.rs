//! Storage trait used by the retraining services

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use tsa_common::db::samples;
use tsa_common::models::{ModelVersion, NewSample, TrainingSample};
use tsa_common::Result;
use uuid::Uuid;

use super::versions::{self, NewModelVersion};

/// Durable state of the retraining pipeline
#[async_trait]
pub trait RetrainStore: Send + Sync {
    async fn count_unused_samples(&self) -> Result<u64>;

    /// Snapshot of up to `limit` unused samples, oldest first
    async fn fetch_unused_samples(&self, limit: usize) -> Result<Vec<TrainingSample>>;

    /// Mark exactly `ids` as consumed by `batch_id` (all or nothing)
    async fn mark_used(&self, batch_id: Uuid, ids: &[i64]) -> Result<u64>;

    async fn insert_model_version(&self, new: &NewModelVersion) -> Result<ModelVersion>;

    /// Deploy `version`, returning the previously deployed version
    async fn set_deployed(&self, version: i64) -> Result<Option<i64>>;

    async fn get_deployed(&self) -> Result<Option<ModelVersion>>;

    async fn get_version(&self, version: i64) -> Result<Option<ModelVersion>>;

    async fn list_versions(&self, limit: usize) -> Result<Vec<ModelVersion>>;

    /// Time since the newest registered version; `None` if there is none
    async fn time_since_last_version(&self) -> Result<Option<chrono::Duration>>;

    /// Return a batch's samples to the unused pool
    async fn reset_samples(&self, batch_id: Uuid) -> Result<u64>;

    async fn insert_samples(&self, samples: &[NewSample]) -> Result<u64>;
}

/// SQLite-backed [`RetrainStore`]
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl RetrainStore for SqliteStore {
    async fn count_unused_samples(&self) -> Result<u64> {
        samples::count_unused(&self.pool).await
    }

    async fn fetch_unused_samples(&self, limit: usize) -> Result<Vec<TrainingSample>> {
        samples::fetch_unused(&self.pool, limit).await
    }

    async fn mark_used(&self, batch_id: Uuid, ids: &[i64]) -> Result<u64> {
        samples::mark_used(&self.pool, batch_id, ids).await
    }

    async fn insert_model_version(&self, new: &NewModelVersion) -> Result<ModelVersion> {
        versions::insert_version(&self.pool, new).await
    }

    async fn set_deployed(&self, version: i64) -> Result<Option<i64>> {
        versions::set_deployed(&self.pool, version).await
    }

    async fn get_deployed(&self) -> Result<Option<ModelVersion>> {
        versions::get_deployed(&self.pool).await
    }

    async fn get_version(&self, version: i64) -> Result<Option<ModelVersion>> {
        versions::get_version(&self.pool, version).await
    }

    async fn list_versions(&self, limit: usize) -> Result<Vec<ModelVersion>> {
        versions::list_versions(&self.pool, limit).await
    }

    async fn time_since_last_version(&self) -> Result<Option<chrono::Duration>> {
        let last = versions::last_trained_at(&self.pool).await?;
        Ok(last.map(|at| Utc::now() - at))
    }

    async fn reset_samples(&self, batch_id: Uuid) -> Result<u64> {
        samples::reset_batch(&self.pool, batch_id).await
    }

    async fn insert_samples(&self, new_samples: &[NewSample]) -> Result<u64> {
        samples::insert_samples(&self.pool, new_samples).await
    }
}
