//! Model version registry persistence
//!
//! Version numbers are assigned inside the insert transaction, so they are
//! strictly increasing even with concurrent writers.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tsa_common::db::{retry_on_lock, MAX_LOCK_WAIT_MS};
use tsa_common::models::{ModelMetrics, ModelVersion};
use tsa_common::{Error, Result};
use uuid::Uuid;

/// Version row to be registered (version number assigned by storage)
#[derive(Debug, Clone, PartialEq)]
pub struct NewModelVersion {
    pub model_path: String,
    pub metrics: ModelMetrics,
    pub validation_metrics: ModelMetrics,
    pub sample_count: u64,
    pub training_batch_id: Uuid,
}

const SELECT_COLUMNS: &str = "SELECT version, model_path, metrics, validation_metrics, \
     sample_count, trained_at, is_deployed, training_batch_id FROM model_versions";

/// Insert a new, undeployed version
///
/// Fails with [`Error::Conflict`] if the batch already has a version.
pub async fn insert_version(pool: &SqlitePool, new: &NewModelVersion) -> Result<ModelVersion> {
    let metrics = serde_json::to_string(&new.metrics)
        .map_err(|e| Error::Internal(format!("Failed to serialize metrics: {}", e)))?;
    let validation_metrics = serde_json::to_string(&new.validation_metrics)
        .map_err(|e| Error::Internal(format!("Failed to serialize metrics: {}", e)))?;
    let trained_at = Utc::now();
    let trained_at_text = trained_at.to_rfc3339();
    let batch = new.training_batch_id.to_string();

    let metrics = metrics.as_str();
    let validation_metrics = validation_metrics.as_str();
    let trained_at_text = trained_at_text.as_str();
    let batch = batch.as_str();

    let version = retry_on_lock("insert_version", MAX_LOCK_WAIT_MS, move || async move {
        let mut tx = pool.begin().await?;

        let existing: Option<i64> =
            sqlx::query_scalar("SELECT version FROM model_versions WHERE training_batch_id = ?")
                .bind(batch)
                .fetch_optional(&mut *tx)
                .await?;
        if let Some(existing) = existing {
            tx.rollback().await?;
            return Err(Error::Conflict(format!(
                "batch {} already registered as version {}",
                batch, existing
            )));
        }

        let version: i64 =
            sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) + 1 FROM model_versions")
                .fetch_one(&mut *tx)
                .await?;

        sqlx::query(
            r#"
            INSERT INTO model_versions (
                version, model_path, metrics, validation_metrics,
                sample_count, trained_at, is_deployed, training_batch_id
            ) VALUES (?, ?, ?, ?, ?, ?, 0, ?)
            "#,
        )
        .bind(version)
        .bind(&new.model_path)
        .bind(metrics)
        .bind(validation_metrics)
        .bind(new.sample_count as i64)
        .bind(trained_at_text)
        .bind(batch)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(version)
    })
    .await?;

    Ok(ModelVersion {
        version,
        model_path: new.model_path.clone(),
        metrics: new.metrics,
        validation_metrics: new.validation_metrics,
        sample_count: new.sample_count,
        trained_at,
        is_deployed: false,
        training_batch_id: new.training_batch_id,
    })
}

/// Make `version` the only deployed row
///
/// Returns the previously deployed version, if any.
pub async fn set_deployed(pool: &SqlitePool, version: i64) -> Result<Option<i64>> {
    retry_on_lock("set_deployed", MAX_LOCK_WAIT_MS, move || async move {
        let mut tx = pool.begin().await?;

        let exists: Option<i64> =
            sqlx::query_scalar("SELECT version FROM model_versions WHERE version = ?")
                .bind(version)
                .fetch_optional(&mut *tx)
                .await?;
        if exists.is_none() {
            tx.rollback().await?;
            return Err(Error::NotFound(format!("model version {}", version)));
        }

        let previous: Option<i64> =
            sqlx::query_scalar("SELECT version FROM model_versions WHERE is_deployed = 1")
                .fetch_optional(&mut *tx)
                .await?;

        sqlx::query("UPDATE model_versions SET is_deployed = 0 WHERE is_deployed = 1")
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE model_versions SET is_deployed = 1 WHERE version = ?")
            .bind(version)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(previous)
    })
    .await
}

pub async fn get_deployed(pool: &SqlitePool) -> Result<Option<ModelVersion>> {
    let row = sqlx::query(&format!("{} WHERE is_deployed = 1", SELECT_COLUMNS))
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(version_from_row).transpose()
}

pub async fn get_version(pool: &SqlitePool, version: i64) -> Result<Option<ModelVersion>> {
    let row = sqlx::query(&format!("{} WHERE version = ?", SELECT_COLUMNS))
        .bind(version)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(version_from_row).transpose()
}

/// Most recent versions first
pub async fn list_versions(pool: &SqlitePool, limit: usize) -> Result<Vec<ModelVersion>> {
    let rows = sqlx::query(&format!("{} ORDER BY version DESC LIMIT ?", SELECT_COLUMNS))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(pool)
        .await?;
    rows.iter().map(version_from_row).collect()
}

/// Registration time of the newest version, deployed or not
pub async fn last_trained_at(pool: &SqlitePool) -> Result<Option<DateTime<Utc>>> {
    let latest: Option<String> =
        sqlx::query_scalar("SELECT trained_at FROM model_versions ORDER BY version DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;
    latest.map(|s| parse_timestamp(&s)).transpose()
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse trained_at: {}", e)))
}

fn parse_metrics(value: &str) -> Result<ModelMetrics> {
    serde_json::from_str(value)
        .map_err(|e| Error::Internal(format!("Failed to parse metrics: {}", e)))
}

fn version_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ModelVersion> {
    let metrics: String = row.get("metrics");
    let validation_metrics: String = row.get("validation_metrics");
    let trained_at: String = row.get("trained_at");
    let batch: String = row.get("training_batch_id");

    Ok(ModelVersion {
        version: row.get("version"),
        model_path: row.get("model_path"),
        metrics: parse_metrics(&metrics)?,
        validation_metrics: parse_metrics(&validation_metrics)?,
        sample_count: row.get::<i64, _>("sample_count").max(0) as u64,
        trained_at: parse_timestamp(&trained_at)?,
        is_deployed: row.get::<i64, _>("is_deployed") != 0,
        training_batch_id: Uuid::parse_str(&batch)
            .map_err(|e| Error::Internal(format!("Failed to parse training_batch_id: {}", e)))?,
    })
}
