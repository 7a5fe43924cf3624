//! Service info and health endpoints

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub message: String,
    pub module: String,
    pub version: String,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok" when a model is being served, "degraded" otherwise
    pub status: String,
    pub module: String,
    pub version: String,
    pub model_loaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_version: Option<i64>,
    pub cycle_running: bool,
    pub uptime_seconds: u64,
    /// Last background failure, for diagnostics
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// GET /
pub async fn service_info() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        message: "Sentiment Analysis API".to_string(),
        module: "tsa-rt".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let model_loaded = state.model_cache.is_loaded().await;
    let model_version = state.model_cache.loaded_version().await;
    let last_error = state.last_error.read().await.clone();

    Json(HealthResponse {
        status: if model_loaded { "ok" } else { "degraded" }.to_string(),
        module: "tsa-rt".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model_loaded,
        model_version,
        cycle_running: state.orchestrator.is_running(),
        uptime_seconds: uptime.num_seconds().max(0) as u64,
        last_error,
    })
}

pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(service_info))
        .route("/health", get(health_check))
}
