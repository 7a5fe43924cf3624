//! Training sample database operations
//!
//! The pool snapshot is identified by sample id: a cycle fetches a set of ids
//! and later marks exactly that set, never "whatever is unused now".

use chrono::Utc;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use uuid::Uuid;

use super::retry::{retry_on_lock, MAX_LOCK_WAIT_MS};
use crate::models::{NewSample, Sentiment, TrainingSample};
use crate::{Error, Result};

/// Rows per multi-row INSERT / IN list
const CHUNK_SIZE: usize = 500;

/// Insert labeled samples in one transaction
///
/// Returns number of rows inserted.
pub async fn insert_samples(pool: &SqlitePool, samples: &[NewSample]) -> Result<u64> {
    if samples.is_empty() {
        return Ok(0);
    }
    let created_at = Utc::now().to_rfc3339();
    let created_at = created_at.as_str();

    retry_on_lock("insert_samples", MAX_LOCK_WAIT_MS, move || async move {
        let mut tx = pool.begin().await?;
        let mut inserted = 0u64;

        for chunk in samples.chunks(CHUNK_SIZE) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO training_samples (text, label, source, used_for_training, created_at) ",
            );
            qb.push_values(chunk, |mut row, sample| {
                row.push_bind(&sample.text)
                    .push_bind(sample.label.as_str())
                    .push_bind(&sample.source)
                    .push_bind(0i64)
                    .push_bind(created_at);
            });
            inserted += qb.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    })
    .await
}

/// Count samples not yet consumed by any cycle
pub async fn count_unused(pool: &SqlitePool) -> Result<u64> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM training_samples WHERE used_for_training = 0")
            .fetch_one(pool)
            .await?;
    Ok(count.max(0) as u64)
}

/// Fetch up to `limit` unused samples, oldest first
pub async fn fetch_unused(pool: &SqlitePool, limit: usize) -> Result<Vec<TrainingSample>> {
    let rows = sqlx::query(
        r#"
        SELECT id, text, label, source, used_for_training, training_batch_id, created_at
        FROM training_samples
        WHERE used_for_training = 0
        ORDER BY id
        LIMIT ?
        "#,
    )
    .bind(i64::try_from(limit).unwrap_or(i64::MAX))
    .fetch_all(pool)
    .await?;

    rows.iter().map(sample_from_row).collect()
}

/// Mark exactly `ids` as consumed by `batch_id`
///
/// All-or-nothing: if any id is missing or already consumed the transaction
/// is rolled back and [`Error::Conflict`] is returned.
pub async fn mark_used(pool: &SqlitePool, batch_id: Uuid, ids: &[i64]) -> Result<u64> {
    if ids.is_empty() {
        return Ok(0);
    }
    let batch = batch_id.to_string();
    let batch = batch.as_str();

    retry_on_lock("mark_used", MAX_LOCK_WAIT_MS, move || async move {
        let mut tx = pool.begin().await?;
        let mut updated = 0u64;

        for chunk in ids.chunks(CHUNK_SIZE) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "UPDATE training_samples SET used_for_training = 1, training_batch_id = ",
            );
            qb.push_bind(batch);
            qb.push(" WHERE used_for_training = 0 AND id IN (");
            let mut separated = qb.separated(", ");
            for id in chunk {
                separated.push_bind(*id);
            }
            separated.push_unseparated(")");
            updated += qb.build().execute(&mut *tx).await?.rows_affected();
        }

        if updated != ids.len() as u64 {
            tx.rollback().await?;
            return Err(Error::Conflict(format!(
                "expected to mark {} samples for batch {}, only {} were still unused",
                ids.len(),
                batch,
                updated
            )));
        }

        tx.commit().await?;
        Ok(updated)
    })
    .await
}

/// Return a consumed batch to the pool
pub async fn reset_batch(pool: &SqlitePool, batch_id: Uuid) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE training_samples SET used_for_training = 0, training_batch_id = NULL \
         WHERE training_batch_id = ?",
    )
    .bind(batch_id.to_string())
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Count samples consumed by `batch_id`
pub async fn count_in_batch(pool: &SqlitePool, batch_id: Uuid) -> Result<u64> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM training_samples WHERE training_batch_id = ?")
            .bind(batch_id.to_string())
            .fetch_one(pool)
            .await?;
    Ok(count.max(0) as u64)
}

/// Load specific samples by id (order by id)
pub async fn get_samples(pool: &SqlitePool, ids: &[i64]) -> Result<Vec<TrainingSample>> {
    let mut samples = Vec::with_capacity(ids.len());
    for chunk in ids.chunks(CHUNK_SIZE) {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, text, label, source, used_for_training, training_batch_id, created_at \
             FROM training_samples WHERE id IN (",
        );
        let mut separated = qb.separated(", ");
        for id in chunk {
            separated.push_bind(*id);
        }
        separated.push_unseparated(") ORDER BY id");
        let rows = qb.build().fetch_all(pool).await?;
        for row in &rows {
            samples.push(sample_from_row(row)?);
        }
    }
    Ok(samples)
}

fn sample_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<TrainingSample> {
    let label: String = row.get("label");
    let created_at: String = row.get("created_at");
    let created_at = chrono::DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| Error::Internal(format!("Failed to parse created_at: {}", e)))?
        .with_timezone(&Utc);
    let batch: Option<String> = row.get("training_batch_id");
    let training_batch_id = batch
        .map(|s| Uuid::parse_str(&s))
        .transpose()
        .map_err(|e| Error::Internal(format!("Failed to parse training_batch_id: {}", e)))?;

    Ok(TrainingSample {
        id: row.get("id"),
        text: row.get("text"),
        label: Sentiment::parse_lenient(&label),
        source: row.get("source"),
        used_for_training: row.get::<i64, _>("used_for_training") != 0,
        created_at,
        training_batch_id,
    })
}
