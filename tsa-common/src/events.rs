//! Event types for the TSA event system
//!
//! Provides the shared event enum and EventBus. Events are broadcast
//! in-process and forwarded to SSE clients by the services.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::ModelMetrics;

/// TSA event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TsaEvent {
    /// A retraining cycle passed the trigger check and started working
    RetrainCycleStarted {
        cycle_id: Uuid,
        forced: bool,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Cycle moved to a new phase
    RetrainPhaseChanged {
        cycle_id: Uuid,
        old_phase: String,
        new_phase: String,
        timestamp: DateTime<Utc>,
    },

    /// Trigger said retraining is not needed
    RetrainCycleSkipped {
        cycle_id: Uuid,
        unused_samples: u64,
        timestamp: DateTime<Utc>,
    },

    /// Cycle registered a new model version
    RetrainCycleCompleted {
        cycle_id: Uuid,
        version: i64,
        promoted: bool,
        metrics: ModelMetrics,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// Cycle aborted
    RetrainCycleFailed {
        cycle_id: Uuid,
        phase: String,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// Deployed model changed
    ModelPromoted {
        version: i64,
        previous_version: Option<i64>,
        timestamp: DateTime<Utc>,
    },

    /// Ingestion flushed a batch of posts
    PostsBatchFlushed {
        received: usize,
        inserted: u64,
        timestamp: DateTime<Utc>,
    },
}

impl TsaEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            TsaEvent::RetrainCycleStarted { .. } => "RetrainCycleStarted",
            TsaEvent::RetrainPhaseChanged { .. } => "RetrainPhaseChanged",
            TsaEvent::RetrainCycleSkipped { .. } => "RetrainCycleSkipped",
            TsaEvent::RetrainCycleCompleted { .. } => "RetrainCycleCompleted",
            TsaEvent::RetrainCycleFailed { .. } => "RetrainCycleFailed",
            TsaEvent::ModelPromoted { .. } => "ModelPromoted",
            TsaEvent::PostsBatchFlushed { .. } => "PostsBatchFlushed",
        }
    }
}

/// Broadcast bus for [`TsaEvent`]s
///
/// Cloning shares the underlying channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<TsaEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Slow subscribers lose the oldest events once `capacity` is exceeded.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<TsaEvent> {
        self.tx.subscribe()
    }

    /// Emit an event; `Err` if nobody is listening
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: TsaEvent) -> Result<usize, broadcast::error::SendError<TsaEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: TsaEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
