//! Serving-side cache of the deployed model
//!
//! Reloads from disk only when the deployed version changes.

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use tsa_common::models::ModelVersion;

use crate::error::RetrainError;
use crate::services::registry::ModelRegistry;
use crate::services::trainer::{SentimentModel, Trainer};

#[derive(Clone)]
pub struct LoadedModel {
    pub version: ModelVersion,
    pub model: Arc<dyn SentimentModel>,
}

pub struct ModelCache {
    registry: ModelRegistry,
    trainer: Arc<dyn Trainer>,
    loaded: RwLock<Option<LoadedModel>>,
}

impl ModelCache {
    pub fn new(registry: ModelRegistry, trainer: Arc<dyn Trainer>) -> Self {
        Self {
            registry,
            trainer,
            loaded: RwLock::new(None),
        }
    }

    /// Deployed model, loading it if the deployed version changed
    pub async fn current(&self) -> Result<LoadedModel, RetrainError> {
        let deployed = self.registry.current().await?;

        if let Some(loaded) = self.loaded.read().await.as_ref() {
            if loaded.version.version == deployed.version {
                return Ok(loaded.clone());
            }
        }

        let mut slot = self.loaded.write().await;
        if let Some(loaded) = slot.as_ref() {
            if loaded.version.version == deployed.version {
                return Ok(loaded.clone());
            }
        }

        let trainer = Arc::clone(&self.trainer);
        let path = std::path::PathBuf::from(&deployed.model_path);
        let model = tokio::task::spawn_blocking(move || trainer.load(&path))
            .await
            .map_err(|e| RetrainError::TrainingFailure(format!("model load task failed: {}", e)))??;

        info!(version = deployed.version, path = %deployed.model_path, "Loaded deployed model");
        let loaded = LoadedModel {
            version: deployed,
            model,
        };
        *slot = Some(loaded.clone());
        Ok(loaded)
    }

    /// Whether a deployed model can be served
    pub async fn is_loaded(&self) -> bool {
        self.current().await.is_ok()
    }

    pub async fn loaded_version(&self) -> Option<i64> {
        self.loaded.read().await.as_ref().map(|l| l.version.version)
    }
}
