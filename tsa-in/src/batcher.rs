//! Bounded batching consumer between the stream reader and storage
//!
//! The reader pushes posts into a bounded `mpsc` channel and blocks when the
//! consumer falls behind. The consumer task writes a batch when `batch_size`
//! posts have accumulated, when `flush_interval` elapses with posts pending,
//! and once more when the channel closes.

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use tsa_common::config::IngestConfig;
use tsa_common::events::{EventBus, TsaEvent};
use tsa_common::models::RawPost;

use crate::db::posts;
use crate::error::{IngestError, Result};

/// Destination for flushed batches
#[async_trait]
pub trait PostSink: Send + Sync {
    /// Persist a batch; returns how many posts were newly stored
    async fn write_batch(&self, posts: &[RawPost]) -> tsa_common::Result<u64>;
}

/// Writes batches to the raw_posts table
pub struct SqlitePostSink {
    pool: SqlitePool,
}

impl SqlitePostSink {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PostSink for SqlitePostSink {
    async fn write_batch(&self, batch: &[RawPost]) -> tsa_common::Result<u64> {
        posts::insert_posts(&self.pool, batch).await
    }
}

/// Logs each post instead of storing it (`--no-db`)
pub struct LogOnlySink;

#[async_trait]
impl PostSink for LogOnlySink {
    async fn write_batch(&self, batch: &[RawPost]) -> tsa_common::Result<u64> {
        for post in batch {
            info!(post_id = %post.post_id, text = %post.text, "Captured post");
        }
        Ok(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPolicy {
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub channel_capacity: usize,
}

impl From<&IngestConfig> for BatchPolicy {
    fn from(config: &IngestConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            flush_interval: Duration::from_millis(config.flush_interval_ms.max(1)),
            channel_capacity: config.channel_capacity.max(1),
        }
    }
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self::from(&IngestConfig::default())
    }
}

/// Counters reported when the batcher shuts down
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatcherStats {
    pub received: u64,
    pub batches: u64,
    pub inserted: u64,
    /// Posts in batches the sink rejected
    pub dropped: u64,
}

/// Handle to a running batching consumer
pub struct PostBatcher {
    tx: mpsc::Sender<RawPost>,
    join: JoinHandle<BatcherStats>,
}

impl PostBatcher {
    /// Start the consumer task
    pub fn spawn(policy: BatchPolicy, sink: Arc<dyn PostSink>, event_bus: Option<EventBus>) -> Self {
        let (tx, rx) = mpsc::channel(policy.channel_capacity);
        info!(
            batch_size = policy.batch_size,
            flush_interval_ms = policy.flush_interval.as_millis() as u64,
            channel_capacity = policy.channel_capacity,
            "Post batcher started"
        );
        let join = tokio::spawn(run_batcher(rx, policy, sink, event_bus));
        Self { tx, join }
    }

    /// Extra producer handle; the batcher drains once all senders are gone
    pub fn sender(&self) -> mpsc::Sender<RawPost> {
        self.tx.clone()
    }

    /// Queue a post, waiting while the channel is full
    pub async fn submit(&self, post: RawPost) -> Result<()> {
        self.tx.send(post).await.map_err(|_| IngestError::BatcherClosed)
    }

    /// Close the channel, flush what is pending and return the counters
    pub async fn close(self) -> BatcherStats {
        drop(self.tx);
        match self.join.await {
            Ok(stats) => stats,
            Err(e) => {
                error!("Post batcher task failed: {}", e);
                BatcherStats::default()
            }
        }
    }
}

async fn run_batcher(
    mut rx: mpsc::Receiver<RawPost>,
    policy: BatchPolicy,
    sink: Arc<dyn PostSink>,
    event_bus: Option<EventBus>,
) -> BatcherStats {
    let mut stats = BatcherStats::default();
    let mut buffer: Vec<RawPost> = Vec::with_capacity(policy.batch_size);

    let mut ticker = tokio::time::interval(policy.flush_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Some(post) => {
                    stats.received += 1;
                    buffer.push(post);
                    if buffer.len() >= policy.batch_size {
                        flush(&mut buffer, sink.as_ref(), event_bus.as_ref(), &mut stats).await;
                        ticker.reset();
                    }
                }
                None => break,
            },
            _ = ticker.tick() => {
                if !buffer.is_empty() {
                    debug!(pending = buffer.len(), "Flush interval elapsed");
                    flush(&mut buffer, sink.as_ref(), event_bus.as_ref(), &mut stats).await;
                }
            }
        }
    }

    if !buffer.is_empty() {
        flush(&mut buffer, sink.as_ref(), event_bus.as_ref(), &mut stats).await;
    }

    info!(
        received = stats.received,
        batches = stats.batches,
        inserted = stats.inserted,
        dropped = stats.dropped,
        "Post batcher stopped"
    );
    stats
}

async fn flush(
    buffer: &mut Vec<RawPost>,
    sink: &dyn PostSink,
    event_bus: Option<&EventBus>,
    stats: &mut BatcherStats,
) {
    let batch = std::mem::take(buffer);
    let size = batch.len();

    match sink.write_batch(&batch).await {
        Ok(inserted) => {
            stats.batches += 1;
            stats.inserted += inserted;
            if inserted < size as u64 {
                debug!(size, inserted, "Some posts were already stored");
            }
            info!(size, inserted, "Flushed post batch");
            if let Some(bus) = event_bus {
                bus.emit_lossy(TsaEvent::PostsBatchFlushed {
                    received: size,
                    inserted,
                    timestamp: Utc::now(),
                });
            }
        }
        Err(e) => {
            stats.dropped += size as u64;
            warn!(size, error = %e, "Failed to store post batch, dropping it");
        }
    }
}
