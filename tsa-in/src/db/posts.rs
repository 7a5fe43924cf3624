//! raw_posts table operations

use chrono::Utc;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use tsa_common::db::{retry_on_lock, MAX_LOCK_WAIT_MS};
use tsa_common::models::RawPost;
use tsa_common::{Error, Result};

/// Rows per multi-row INSERT
const CHUNK_SIZE: usize = 500;

/// Insert posts in one transaction, ignoring post ids already stored
///
/// Returns the number of new rows.
pub async fn insert_posts(pool: &SqlitePool, posts: &[RawPost]) -> Result<u64> {
    if posts.is_empty() {
        return Ok(0);
    }

    retry_on_lock("insert_posts", MAX_LOCK_WAIT_MS, move || async move {
        let mut tx = pool.begin().await?;
        let mut inserted = 0u64;

        for chunk in posts.chunks(CHUNK_SIZE) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT OR IGNORE INTO raw_posts (post_id, text, created_at, author_id, lang) ",
            );
            qb.push_values(chunk, |mut row, post| {
                row.push_bind(&post.post_id)
                    .push_bind(&post.text)
                    .push_bind(post.created_at.to_rfc3339())
                    .push_bind(&post.author_id)
                    .push_bind(&post.lang);
            });
            inserted += qb.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    })
    .await
}

pub async fn count_posts(pool: &SqlitePool) -> Result<u64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM raw_posts")
        .fetch_one(pool)
        .await?;
    Ok(count.max(0) as u64)
}

pub async fn get_post(pool: &SqlitePool, post_id: &str) -> Result<Option<RawPost>> {
    let row = sqlx::query(
        "SELECT post_id, text, created_at, author_id, lang FROM raw_posts WHERE post_id = ?",
    )
    .bind(post_id)
    .fetch_optional(pool)
    .await?;

    row.map(|row| {
        let created_at: String = row.get("created_at");
        let created_at = chrono::DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| Error::Internal(format!("Failed to parse created_at: {}", e)))?
            .with_timezone(&Utc);
        Ok(RawPost {
            post_id: row.get("post_id"),
            text: row.get("text"),
            created_at,
            author_id: row.get("author_id"),
            lang: row.get("lang"),
        })
    })
    .transpose()
}
