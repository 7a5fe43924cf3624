//! In-process retraining scheduler
//!
//! Runs a cycle every `check_interval_secs` and whenever a request arrives
//! on the trigger channel. Retryable cycle failures are re-run with
//! exponential backoff, bounded by `max_retries`.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use tsa_common::config::SchedulerConfig;

use crate::error::{CycleError, RetrainError};
use crate::models::CycleOutcome;
use crate::services::orchestrator::RetrainingOrchestrator;

/// Pending on-demand triggers beyond this are rejected
const REQUEST_CHANNEL_CAPACITY: usize = 8;

/// On-demand cycle trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrainRequest {
    pub force: bool,
}

/// Handle to a running scheduler task
pub struct SchedulerHandle {
    tx: mpsc::Sender<RetrainRequest>,
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    pub fn sender(&self) -> mpsc::Sender<RetrainRequest> {
        self.tx.clone()
    }

    /// Stop the loop; a cycle already running finishes first
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.join.await {
            error!("Scheduler task ended abnormally: {}", e);
        }
    }
}

pub struct RetrainScheduler {
    orchestrator: Arc<RetrainingOrchestrator>,
    config: SchedulerConfig,
    last_error: Option<Arc<RwLock<Option<String>>>>,
}

impl RetrainScheduler {
    pub fn new(orchestrator: Arc<RetrainingOrchestrator>, config: SchedulerConfig) -> Self {
        Self {
            orchestrator,
            config,
            last_error: None,
        }
    }

    /// Keep the outcome of the latest cycle in `slot`: the error text after
    /// a failure, cleared after a success
    pub fn with_last_error(mut self, slot: Arc<RwLock<Option<String>>>) -> Self {
        self.last_error = Some(slot);
        self
    }

    pub fn spawn(self) -> SchedulerHandle {
        let (tx, rx) = mpsc::channel(REQUEST_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        let join = tokio::spawn(self.run_loop(rx, cancel.clone()));
        SchedulerHandle { tx, cancel, join }
    }

    async fn run_loop(self, mut rx: mpsc::Receiver<RetrainRequest>, cancel: CancellationToken) {
        let period = Duration::from_secs(self.config.check_interval_secs.max(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut channel_open = true;

        info!(
            enabled = self.config.enabled,
            check_interval_secs = period.as_secs(),
            max_retries = self.config.max_retries,
            "Retraining scheduler started"
        );

        loop {
            let force = tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick(), if self.config.enabled => false,
                request = rx.recv(), if channel_open => match request {
                    Some(request) => request.force,
                    None => {
                        channel_open = false;
                        continue;
                    }
                },
            };

            let result = self.run_with_retry(force, &cancel).await;
            log_result(force, &result);
            self.record_result(&result).await;
        }

        info!("Retraining scheduler stopped");
    }

    async fn record_result(&self, result: &Result<Option<CycleOutcome>, CycleError>) {
        let Some(slot) = &self.last_error else {
            return;
        };
        match result {
            Ok(Some(_)) => *slot.write().await = None,
            Ok(None) => {}
            Err(err) if matches!(err.source, RetrainError::CycleInProgress) => {}
            Err(err) => *slot.write().await = Some(err.to_string()),
        }
    }

    /// Run a cycle, re-running retryable failures with backoff
    pub async fn run_with_retry(
        &self,
        force: bool,
        cancel: &CancellationToken,
    ) -> Result<Option<CycleOutcome>, CycleError> {
        let timeout = Duration::from_secs(self.config.cycle_timeout_secs);
        let mut retries = 0u32;

        loop {
            let err = match self
                .orchestrator
                .run_retraining_cycle_with_timeout(force, timeout)
                .await
            {
                Ok(outcome) => return Ok(outcome),
                Err(err) => err,
            };

            if !err.is_retryable() || retries >= self.config.max_retries {
                return Err(err);
            }
            retries += 1;

            let backoff = backoff_delay(self.config.retry_backoff_secs, retries);
            warn!(
                cycle_id = %err.cycle_id,
                phase = ?err.phase,
                retry = retries,
                max_retries = self.config.max_retries,
                backoff_secs = backoff.as_secs(),
                error = %err.source,
                "Retrying retraining cycle after transient failure"
            );

            tokio::select! {
                _ = cancel.cancelled() => return Err(err),
                _ = tokio::time::sleep(backoff) => {}
            }
        }
    }
}

/// `base * 2^(retry - 1)` seconds
fn backoff_delay(base_secs: u64, retry: u32) -> Duration {
    let factor = 1u64 << retry.saturating_sub(1).min(16);
    Duration::from_secs(base_secs.saturating_mul(factor))
}

fn log_result(force: bool, result: &Result<Option<CycleOutcome>, CycleError>) {
    match result {
        Ok(Some(outcome)) => info!(
            cycle_id = %outcome.cycle_id,
            version = outcome.version.version,
            promoted = outcome.promoted,
            "Scheduled retraining produced a new model"
        ),
        Ok(None) => debug!(force, "Scheduled check: retraining not needed"),
        Err(err) if matches!(err.source, RetrainError::CycleInProgress) => {
            warn!("Scheduled check skipped: a cycle is already running")
        }
        Err(err) => error!(
            cycle_id = %err.cycle_id,
            phase = ?err.phase,
            retryable = err.is_retryable(),
            error = %err,
            "Scheduled retraining failed"
        ),
    }
}
