//! GET /model/info

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use tsa_common::models::ModelVersion;

use crate::error::{ApiResult, RetrainError};
use crate::AppState;

const RECENT_MODELS: usize = 10;

#[derive(Debug, Serialize)]
pub struct ModelInfoResponse {
    /// `null` before the first successful cycle
    pub deployed_model: Option<ModelVersion>,
    pub recent_models: Vec<ModelVersion>,
}

pub async fn model_info(State(state): State<AppState>) -> ApiResult<Json<ModelInfoResponse>> {
    let registry = state.orchestrator.registry();
    let deployed_model = match registry.current().await {
        Ok(version) => Some(version),
        Err(RetrainError::NoDeployedModel) => None,
        Err(e) => return Err(e.into()),
    };
    let recent_models = registry.list_recent(RECENT_MODELS).await?;

    Ok(Json(ModelInfoResponse {
        deployed_model,
        recent_models,
    }))
}

pub fn model_info_routes() -> Router<AppState> {
    Router::new().route("/model/info", get(model_info))
}
