//! Shared test fixtures for tsa-rt integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

use tsa_common::config::{RetrainConfig, TrainerConfig};
use tsa_common::db::init_memory_database;
use tsa_common::events::EventBus;
use tsa_common::models::{ModelVersion, NewSample, Sentiment, TrainingSample};
use tsa_common::{Error, Result};
use tsa_rt::db::{NewModelVersion, RetrainStore, SqliteStore};
use tsa_rt::services::{
    BowTrainer, RetrainingOrchestrator, SentimentModel, TrainedModel, Trainer,
};
use tsa_rt::RetrainError;

const POSITIVE: &[&str] = &[
    "I absolutely love this product, best purchase ever",
    "This is amazing, highly recommend it to everyone",
    "Great quality and fast shipping, very satisfied",
    "wonderful experience, love love love it",
];
const NEGATIVE: &[&str] = &[
    "Terrible experience, would not recommend",
    "Worst product I have ever bought, complete waste of money",
    "Very disappointed with the quality, not worth it",
    "awful, broken on arrival, hate it",
];
const NEUTRAL: &[&str] = &[
    "It is okay, nothing special but does the job",
    "Average product, met my expectations",
    "Not bad, not great, just okay for the price",
    "fine I guess, ordinary and average",
];

/// `per_class` labeled samples for each sentiment
pub fn labeled_samples(per_class: usize) -> Vec<NewSample> {
    let mut samples = Vec::with_capacity(per_class * 3);
    for (label, phrases) in [
        (Sentiment::Positive, POSITIVE),
        (Sentiment::Negative, NEGATIVE),
        (Sentiment::Neutral, NEUTRAL),
    ] {
        for i in 0..per_class {
            samples.push(NewSample::new(
                format!("{} #{}", phrases[i % phrases.len()], i),
                label,
                "test",
            ));
        }
    }
    samples
}

pub fn test_trainer_config() -> TrainerConfig {
    TrainerConfig {
        num_epochs: 5,
        batch_size: 8,
        feature_dim: 512,
        ..TrainerConfig::default()
    }
}

pub fn test_retrain_config() -> RetrainConfig {
    RetrainConfig {
        min_pool_size: 30,
        ..RetrainConfig::default()
    }
}

/// Store wrapper that injects failures into the SQLite implementation
pub struct TestStore {
    pub inner: SqliteStore,
    /// Remaining transient failures of `count_unused_samples`
    pub transient_count_failures: AtomicU32,
    pub fail_mark_used: AtomicBool,
    pub fail_set_deployed: AtomicBool,
    pub count_calls: AtomicU32,
    pub fetch_calls: AtomicU32,
}

impl TestStore {
    pub async fn new() -> Arc<Self> {
        let pool = init_memory_database().await.unwrap();
        Arc::new(Self {
            inner: SqliteStore::new(pool),
            transient_count_failures: AtomicU32::new(0),
            fail_mark_used: AtomicBool::new(false),
            fail_set_deployed: AtomicBool::new(false),
            count_calls: AtomicU32::new(0),
            fetch_calls: AtomicU32::new(0),
        })
    }

    pub async fn seed(&self, per_class: usize) {
        self.inner.insert_samples(&labeled_samples(per_class)).await.unwrap();
    }
}

#[async_trait]
impl RetrainStore for TestStore {
    async fn count_unused_samples(&self) -> Result<u64> {
        self.count_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.transient_count_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_count_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::Database(sqlx::Error::PoolTimedOut));
        }
        self.inner.count_unused_samples().await
    }

    async fn fetch_unused_samples(&self, limit: usize) -> Result<Vec<TrainingSample>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch_unused_samples(limit).await
    }

    async fn mark_used(&self, batch_id: Uuid, ids: &[i64]) -> Result<u64> {
        if self.fail_mark_used.load(Ordering::SeqCst) {
            return Err(Error::Internal("simulated mark_used failure".to_string()));
        }
        self.inner.mark_used(batch_id, ids).await
    }

    async fn insert_model_version(&self, new: &NewModelVersion) -> Result<ModelVersion> {
        self.inner.insert_model_version(new).await
    }

    async fn set_deployed(&self, version: i64) -> Result<Option<i64>> {
        if self.fail_set_deployed.load(Ordering::SeqCst) {
            return Err(Error::Internal("simulated set_deployed failure".to_string()));
        }
        self.inner.set_deployed(version).await
    }

    async fn get_deployed(&self) -> Result<Option<ModelVersion>> {
        self.inner.get_deployed().await
    }

    async fn get_version(&self, version: i64) -> Result<Option<ModelVersion>> {
        self.inner.get_version(version).await
    }

    async fn list_versions(&self, limit: usize) -> Result<Vec<ModelVersion>> {
        self.inner.list_versions(limit).await
    }

    async fn time_since_last_version(&self) -> Result<Option<chrono::Duration>> {
        self.inner.time_since_last_version().await
    }

    async fn reset_samples(&self, batch_id: Uuid) -> Result<u64> {
        self.inner.reset_samples(batch_id).await
    }

    async fn insert_samples(&self, samples: &[NewSample]) -> Result<u64> {
        self.inner.insert_samples(samples).await
    }
}

/// Orchestrator over `store` writing models into a fresh temp dir
pub struct Fixture {
    pub store: Arc<TestStore>,
    pub orchestrator: Arc<RetrainingOrchestrator>,
    pub event_bus: EventBus,
    pub model_dir: TempDir,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::with_trainer(Arc::new(default_trainer())).await
    }

    pub async fn with_trainer(trainer: Arc<dyn Trainer>) -> Self {
        Self::with(trainer, test_retrain_config()).await
    }

    pub async fn with(trainer: Arc<dyn Trainer>, config: RetrainConfig) -> Self {
        let store = TestStore::new().await;
        let event_bus = EventBus::new(256);
        let model_dir = tempfile::tempdir().unwrap();
        let orchestrator = RetrainingOrchestrator::new(
            store.clone(),
            trainer,
            config,
            model_dir.path().to_path_buf(),
            event_bus.clone(),
        )
        .unwrap();
        Self {
            store,
            orchestrator: Arc::new(orchestrator),
            event_bus,
            model_dir,
        }
    }

    pub fn model_files(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.model_dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect()
    }
}

pub fn default_trainer() -> BowTrainer {
    BowTrainer::new(test_trainer_config(), 42)
}

/// Trainer that blocks inside `train` until released
pub struct GatedTrainer {
    inner: BowTrainer,
    started: Mutex<mpsc::Sender<()>>,
    release: Mutex<mpsc::Receiver<()>>,
}

impl GatedTrainer {
    /// Returns the trainer, a receiver signalled when training starts and a
    /// sender that lets it continue
    pub fn new() -> (Self, mpsc::Receiver<()>, mpsc::Sender<()>) {
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        (
            Self {
                inner: default_trainer(),
                started: Mutex::new(started_tx),
                release: Mutex::new(release_rx),
            },
            started_rx,
            release_tx,
        )
    }
}

impl Trainer for GatedTrainer {
    fn train(
        &self,
        train: &[TrainingSample],
        val: &[TrainingSample],
        model_path: &Path,
    ) -> std::result::Result<TrainedModel, RetrainError> {
        let _ = self.started.lock().unwrap().send(());
        let _ = self.release.lock().unwrap().recv();
        self.inner.train(train, val, model_path)
    }

    fn load(&self, model_path: &Path) -> std::result::Result<Arc<dyn SentimentModel>, RetrainError> {
        self.inner.load(model_path)
    }
}

/// Trainer whose fit always fails
pub struct FailingTrainer;

impl Trainer for FailingTrainer {
    fn train(
        &self,
        _: &[TrainingSample],
        _: &[TrainingSample],
        _: &Path,
    ) -> std::result::Result<TrainedModel, RetrainError> {
        Err(RetrainError::TrainingFailure("did not converge".to_string()))
    }

    fn load(&self, _: &Path) -> std::result::Result<Arc<dyn SentimentModel>, RetrainError> {
        Err(RetrainError::TrainingFailure("no model".to_string()))
    }
}

/// Trainer that sleeps before delegating
pub struct SlowTrainer {
    pub delay: Duration,
    pub inner: BowTrainer,
}

impl Trainer for SlowTrainer {
    fn train(
        &self,
        train: &[TrainingSample],
        val: &[TrainingSample],
        model_path: &Path,
    ) -> std::result::Result<TrainedModel, RetrainError> {
        std::thread::sleep(self.delay);
        self.inner.train(train, val, model_path)
    }

    fn load(&self, model_path: &Path) -> std::result::Result<Arc<dyn SentimentModel>, RetrainError> {
        self.inner.load(model_path)
    }
}
