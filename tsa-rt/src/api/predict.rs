//! Prediction endpoints
//!
//! POST /predict, POST /predict/batch

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};

use tsa_common::models::Sentiment;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Texts accepted by one batch request
pub const MAX_BATCH_SIZE: usize = 1000;

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct BatchPredictRequest {
    pub texts: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PredictResponse {
    pub text: String,
    pub sentiment: Sentiment,
    pub confidence: f64,
    pub model_version: i64,
}

fn validate_text(text: &str) -> ApiResult<()> {
    if text.trim().is_empty() {
        return Err(ApiError::Validation("text must not be empty".to_string()));
    }
    Ok(())
}

async fn classify(state: &AppState, texts: Vec<String>) -> ApiResult<Vec<PredictResponse>> {
    let loaded = state.model_cache.current().await?;
    let model = loaded.model;
    let model_version = loaded.version.version;

    let (texts, predictions) = tokio::task::spawn_blocking(move || {
        let predictions = model.predict(&texts);
        (texts, predictions)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("prediction task failed: {}", e)))?;

    Ok(texts
        .into_iter()
        .zip(predictions)
        .map(|(text, prediction)| PredictResponse {
            text,
            sentiment: prediction.label,
            confidence: prediction.confidence,
            model_version,
        })
        .collect())
}

/// POST /predict
pub async fn predict(
    State(state): State<AppState>,
    Json(request): Json<PredictRequest>,
) -> ApiResult<Json<PredictResponse>> {
    validate_text(&request.text)?;
    let mut responses = classify(&state, vec![request.text]).await?;
    responses
        .pop()
        .map(Json)
        .ok_or_else(|| ApiError::Internal("model returned no prediction".to_string()))
}

/// POST /predict/batch
pub async fn predict_batch(
    State(state): State<AppState>,
    Json(request): Json<BatchPredictRequest>,
) -> ApiResult<Json<Vec<PredictResponse>>> {
    if request.texts.is_empty() {
        return Err(ApiError::Validation("texts must not be empty".to_string()));
    }
    if request.texts.len() > MAX_BATCH_SIZE {
        return Err(ApiError::Validation(format!(
            "at most {} texts per batch (got {})",
            MAX_BATCH_SIZE,
            request.texts.len()
        )));
    }
    for text in &request.texts {
        validate_text(text)?;
    }
    Ok(Json(classify(&state, request.texts).await?))
}

pub fn predict_routes() -> Router<AppState> {
    Router::new()
        .route("/predict", post(predict))
        .route("/predict/batch", post(predict_batch))
}
