//! Database initialization
//!
//! Creates the SQLite database on first run and brings the schema up to date.
//! Table creation is idempotent, so every service calls this at startup.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// SQLite busy timeout before a write reports "database is locked"
const BUSY_TIMEOUT_MS: u64 = 250;

/// Open (or create) the database file and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let options = SqliteConnectOptions::from_str(&db_url)?
        .foreign_keys(true)
        // WAL lets ingestion keep writing while a cycle reads its snapshot
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS));

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;
    Ok(pool)
}

/// Single-connection in-memory database, used by tests and dry runs
pub async fn init_memory_database() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;
    create_schema(&pool).await?;
    Ok(pool)
}

/// Create all tables and indexes (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_training_samples_table(pool).await?;
    create_raw_posts_table(pool).await?;
    create_model_versions_table(pool).await?;
    info!("Database tables initialized (training_samples, raw_posts, model_versions)");
    Ok(())
}

async fn create_training_samples_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS training_samples (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            text TEXT NOT NULL,
            label TEXT NOT NULL CHECK (label IN ('negative', 'neutral', 'positive')),
            source TEXT NOT NULL DEFAULT 'unknown',
            used_for_training INTEGER NOT NULL DEFAULT 0,
            training_batch_id TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_training_samples_unused \
         ON training_samples(used_for_training, id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_training_samples_batch \
         ON training_samples(training_batch_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_raw_posts_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS raw_posts (
            post_id TEXT PRIMARY KEY,
            text TEXT NOT NULL,
            created_at TEXT NOT NULL,
            author_id TEXT,
            lang TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_model_versions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS model_versions (
            version INTEGER PRIMARY KEY,
            model_path TEXT NOT NULL,
            metrics TEXT NOT NULL,
            validation_metrics TEXT NOT NULL,
            sample_count INTEGER NOT NULL,
            trained_at TEXT NOT NULL,
            is_deployed INTEGER NOT NULL DEFAULT 0,
            training_batch_id TEXT NOT NULL UNIQUE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // At most one deployed row, enforced by the database itself
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_model_versions_deployed \
         ON model_versions(is_deployed) WHERE is_deployed = 1",
    )
    .execute(pool)
    .await?;

    Ok(())
}
