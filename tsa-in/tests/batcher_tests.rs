//! Post batcher integration tests
//!
//! Size, interval and shutdown flushes, plus persistence through SQLite.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tsa_common::db::init_memory_database;
use tsa_common::events::{EventBus, TsaEvent};
use tsa_common::models::RawPost;
use tsa_common::{Error, Result};
use tsa_in::db::count_posts;
use tsa_in::{BatchPolicy, PostBatcher, SqlitePostSink};
use tsa_in::PostSink;

/// Sink recording the size of every batch it receives
#[derive(Default)]
struct RecordingSink {
    batches: Mutex<Vec<usize>>,
    fail: bool,
}

impl RecordingSink {
    fn sizes(&self) -> Vec<usize> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl PostSink for RecordingSink {
    async fn write_batch(&self, posts: &[RawPost]) -> Result<u64> {
        if self.fail {
            return Err(Error::Internal("sink down".to_string()));
        }
        self.batches.lock().unwrap().push(posts.len());
        Ok(posts.len() as u64)
    }
}

fn post(id: usize) -> RawPost {
    RawPost {
        post_id: id.to_string(),
        text: format!("post number {}", id),
        created_at: Utc::now(),
        author_id: None,
        lang: Some("en".to_string()),
    }
}

fn policy(batch_size: usize, flush_interval: Duration) -> BatchPolicy {
    BatchPolicy {
        batch_size,
        flush_interval,
        channel_capacity: 16,
    }
}

/// TC-IN-001: Full batches flush on size, the remainder on close
#[tokio::test]
async fn tc_in_001_flushes_on_size_and_close() {
    // Given: batch size 3 and an interval far in the future
    let sink = Arc::new(RecordingSink::default());
    let batcher = PostBatcher::spawn(policy(3, Duration::from_secs(3600)), sink.clone(), None);

    // When: 7 posts arrive and the batcher closes
    for i in 0..7 {
        batcher.submit(post(i)).await.unwrap();
    }
    let stats = batcher.close().await;

    // Then: two full batches and one partial
    assert_eq!(sink.sizes(), vec![3, 3, 1]);
    assert_eq!(stats.received, 7);
    assert_eq!(stats.batches, 3);
    assert_eq!(stats.inserted, 7);
    assert_eq!(stats.dropped, 0);
}

/// TC-IN-002: A partial batch flushes once the interval elapses
#[tokio::test]
async fn tc_in_002_flushes_on_interval() {
    let sink = Arc::new(RecordingSink::default());
    let batcher = PostBatcher::spawn(policy(100, Duration::from_millis(50)), sink.clone(), None);

    batcher.submit(post(1)).await.unwrap();
    batcher.submit(post(2)).await.unwrap();

    let flushed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if !sink.sizes().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(flushed.is_ok(), "interval flush did not happen");
    assert_eq!(sink.sizes(), vec![2]);

    let stats = batcher.close().await;
    assert_eq!(stats.batches, 1);
}

/// TC-IN-003: Failed batches are counted as dropped
#[tokio::test]
async fn tc_in_003_sink_failure_drops_batch() {
    let sink = Arc::new(RecordingSink {
        fail: true,
        ..Default::default()
    });
    let batcher = PostBatcher::spawn(policy(2, Duration::from_secs(3600)), sink, None);

    for i in 0..4 {
        batcher.submit(post(i)).await.unwrap();
    }
    let stats = batcher.close().await;

    assert_eq!(stats.received, 4);
    assert_eq!(stats.batches, 0);
    assert_eq!(stats.dropped, 4);
}

/// TC-IN-004: Duplicate post ids are stored once
#[tokio::test]
async fn tc_in_004_sqlite_sink_ignores_duplicates() {
    let pool = init_memory_database().await.unwrap();
    let sink = Arc::new(SqlitePostSink::new(pool.clone()));
    let batcher = PostBatcher::spawn(policy(10, Duration::from_secs(3600)), sink, None);

    for i in [1, 2, 2, 3, 1] {
        batcher.submit(post(i)).await.unwrap();
    }
    let stats = batcher.close().await;

    assert_eq!(stats.received, 5);
    assert_eq!(stats.inserted, 3);
    assert_eq!(count_posts(&pool).await.unwrap(), 3);
}

/// TC-IN-005: Each flush is announced on the event bus
#[tokio::test]
async fn tc_in_005_flush_emits_event() {
    let bus = EventBus::new(10);
    let mut rx = bus.subscribe();
    let sink = Arc::new(RecordingSink::default());
    let batcher = PostBatcher::spawn(policy(2, Duration::from_secs(3600)), sink, Some(bus));

    batcher.submit(post(1)).await.unwrap();
    batcher.submit(post(2)).await.unwrap();
    batcher.close().await;

    match rx.recv().await.unwrap() {
        TsaEvent::PostsBatchFlushed { received, inserted, .. } => {
            assert_eq!(received, 2);
            assert_eq!(inserted, 2);
        }
        other => panic!("unexpected event {:?}", other),
    }
}

/// TC-IN-006: Extra senders keep the batcher alive until dropped
#[tokio::test]
async fn tc_in_006_extra_sender_posts_are_flushed() {
    let sink = Arc::new(RecordingSink::default());
    let batcher = PostBatcher::spawn(policy(50, Duration::from_secs(3600)), sink.clone(), None);

    let tx = batcher.sender();
    let producer = tokio::spawn(async move {
        for i in 0..5 {
            tx.send(post(i)).await.unwrap();
        }
    });
    producer.await.unwrap();

    let stats = batcher.close().await;
    assert_eq!(stats.received, 5);
    assert_eq!(sink.sizes(), vec![5]);
}
