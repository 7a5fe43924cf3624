//! Model registry
//!
//! Append-only record of trained versions plus the single deployed pointer.

use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use tsa_common::events::{EventBus, TsaEvent};
use tsa_common::models::{ModelMetrics, ModelVersion};

use crate::db::{NewModelVersion, RetrainStore};
use crate::error::RetrainError;

#[derive(Clone)]
pub struct ModelRegistry {
    store: Arc<dyn RetrainStore>,
    event_bus: EventBus,
}

impl ModelRegistry {
    pub fn new(store: Arc<dyn RetrainStore>, event_bus: EventBus) -> Self {
        Self { store, event_bus }
    }

    /// Record a new, undeployed version
    pub async fn register(
        &self,
        model_path: String,
        metrics: ModelMetrics,
        validation_metrics: ModelMetrics,
        sample_count: u64,
        batch_id: Uuid,
    ) -> Result<ModelVersion, RetrainError> {
        let version = self
            .store
            .insert_model_version(&NewModelVersion {
                model_path,
                metrics,
                validation_metrics,
                sample_count,
                training_batch_id: batch_id,
            })
            .await?;
        info!(
            version = version.version,
            batch_id = %batch_id,
            f1 = metrics.f1,
            "Registered model version"
        );
        Ok(version)
    }

    /// Deploy `version`
    ///
    /// No-op when it is already deployed. Returns the previously deployed
    /// version when the pointer moved.
    pub async fn promote(&self, version: i64) -> Result<Option<i64>, RetrainError> {
        if let Some(current) = self.store.get_deployed().await? {
            if current.version == version {
                return Ok(None);
            }
        }

        let previous = self.store.set_deployed(version).await?;
        info!(version, previous_version = ?previous, "Promoted model version");
        self.event_bus.emit_lossy(TsaEvent::ModelPromoted {
            version,
            previous_version: previous,
            timestamp: Utc::now(),
        });
        Ok(previous)
    }

    pub async fn current(&self) -> Result<ModelVersion, RetrainError> {
        self.store
            .get_deployed()
            .await?
            .ok_or(RetrainError::NoDeployedModel)
    }

    pub async fn list_recent(&self, limit: usize) -> Result<Vec<ModelVersion>, RetrainError> {
        Ok(self.store.list_versions(limit).await?)
    }

    pub async fn get(&self, version: i64) -> Result<Option<ModelVersion>, RetrainError> {
        Ok(self.store.get_version(version).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;
    use tsa_common::db::init_memory_database;

    async fn registry() -> ModelRegistry {
        let pool = init_memory_database().await.unwrap();
        ModelRegistry::new(Arc::new(SqliteStore::new(pool)), EventBus::new(16))
    }

    async fn register(registry: &ModelRegistry) -> ModelVersion {
        registry
            .register(
                "m.json".to_string(),
                ModelMetrics::default(),
                ModelMetrics::default(),
                10,
                Uuid::new_v4(),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn current_without_deployment_is_error() {
        let registry = registry().await;
        assert!(matches!(
            registry.current().await,
            Err(RetrainError::NoDeployedModel)
        ));
    }

    #[tokio::test]
    async fn promote_moves_pointer_and_emits_event() {
        let registry = registry().await;
        let mut rx = registry.event_bus.subscribe();
        let v1 = register(&registry).await;
        let v2 = register(&registry).await;

        registry.promote(v1.version).await.unwrap();
        let previous = registry.promote(v2.version).await.unwrap();

        assert_eq!(previous, Some(v1.version));
        assert_eq!(registry.current().await.unwrap().version, v2.version);
        let recent = registry.list_recent(10).await.unwrap();
        assert_eq!(recent.iter().filter(|v| v.is_deployed).count(), 1);

        assert!(matches!(rx.recv().await.unwrap(), TsaEvent::ModelPromoted { version: 1, .. }));
    }

    #[tokio::test]
    async fn promoting_deployed_version_is_noop() {
        let registry = registry().await;
        let v1 = register(&registry).await;
        registry.promote(v1.version).await.unwrap();

        let mut rx = registry.event_bus.subscribe();
        assert_eq!(registry.promote(v1.version).await.unwrap(), None);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn promoting_unknown_version_fails() {
        let registry = registry().await;
        let err = registry.promote(42).await.unwrap_err();
        assert!(matches!(err, RetrainError::Storage(tsa_common::Error::NotFound(_))));
    }
}
