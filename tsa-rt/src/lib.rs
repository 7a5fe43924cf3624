//! tsa-rt library interface
//!
//! Continuous retraining of the sentiment classifier plus the HTTP API that
//! serves the deployed model.

pub mod api;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

pub use crate::error::{ApiError, ApiResult, CycleError, RetrainError};

use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tower_http::trace::TraceLayer;
use tsa_common::events::EventBus;

use crate::services::{ModelCache, RetrainRequest, RetrainingOrchestrator};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<RetrainingOrchestrator>,
    pub model_cache: Arc<ModelCache>,
    pub event_bus: EventBus,
    /// On-demand trigger channel of the running scheduler, if any
    pub retrain_tx: Option<mpsc::Sender<RetrainRequest>>,
    pub startup_time: DateTime<Utc>,
    /// Last background failure, for diagnostics
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(orchestrator: Arc<RetrainingOrchestrator>, event_bus: EventBus) -> Self {
        let model_cache = Arc::new(ModelCache::new(
            orchestrator.registry().clone(),
            orchestrator.trainer(),
        ));
        Self {
            orchestrator,
            model_cache,
            event_bus,
            retrain_tx: None,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    pub fn with_retrain_sender(mut self, tx: mpsc::Sender<RetrainRequest>) -> Self {
        self.retrain_tx = Some(tx);
        self
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::health_routes())
        .merge(api::predict_routes())
        .merge(api::model_info_routes())
        .merge(api::retrain_routes())
        .route("/events", get(api::retrain_event_stream))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
