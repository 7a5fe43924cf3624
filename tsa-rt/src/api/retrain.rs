//! Retraining endpoints
//!
//! GET /retrain/check, POST /retrain

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::error::TrySendError;
use tracing::{error, info};

use crate::error::{ApiError, ApiResult};
use crate::models::RetrainReason;
use crate::services::RetrainRequest;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct RetrainCheckResponse {
    pub should_retrain: bool,
    pub reason: RetrainReason,
    pub unused_samples: u64,
    pub hours_since_last_train: Option<f64>,
    pub cycle_running: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct RetrainRequestBody {
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
pub struct RetrainAccepted {
    pub status: String,
    pub force: bool,
}

/// GET /retrain/check
pub async fn check_retraining(
    State(state): State<AppState>,
) -> ApiResult<Json<RetrainCheckResponse>> {
    let status = state.orchestrator.pool_status().await?;
    let decision = state.orchestrator.check_retraining_needed().await?;

    Ok(Json(RetrainCheckResponse {
        should_retrain: decision.should_retrain,
        reason: decision.reason,
        unused_samples: status.unused_samples,
        hours_since_last_train: status.hours_since_last_train,
        cycle_running: state.orchestrator.is_running(),
    }))
}

/// POST /retrain
///
/// Queues a cycle and returns 202 immediately. Without a scheduler the cycle
/// runs as a detached task.
pub async fn trigger_retraining(
    State(state): State<AppState>,
    body: Option<Json<RetrainRequestBody>>,
) -> ApiResult<(StatusCode, Json<RetrainAccepted>)> {
    let force = body.map(|Json(b)| b.force).unwrap_or_default();

    if state.orchestrator.is_running() {
        return Err(ApiError::Conflict(
            "A retraining cycle is already in progress".to_string(),
        ));
    }

    match &state.retrain_tx {
        Some(tx) => tx.try_send(RetrainRequest { force }).map_err(|e| match e {
            TrySendError::Full(_) => {
                ApiError::Conflict("Retraining requests are already queued".to_string())
            }
            TrySendError::Closed(_) => {
                ApiError::Internal("Retraining scheduler is not running".to_string())
            }
        })?,
        None => {
            let orchestrator = state.orchestrator.clone();
            let last_error = state.last_error.clone();
            tokio::spawn(async move {
                match orchestrator.run_retraining_cycle(force).await {
                    Ok(outcome) => {
                        info!(
                            version = ?outcome.as_ref().map(|o| o.version.version),
                            "On-demand retraining finished"
                        );
                        if outcome.is_some() {
                            *last_error.write().await = None;
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "On-demand retraining failed");
                        *last_error.write().await = Some(e.to_string());
                    }
                }
            });
        }
    }

    info!(force, "Retraining requested via API");
    Ok((
        StatusCode::ACCEPTED,
        Json(RetrainAccepted {
            status: "accepted".to_string(),
            force,
        }),
    ))
}

pub fn retrain_routes() -> Router<AppState> {
    Router::new()
        .route("/retrain/check", get(check_retraining))
        .route("/retrain", post(trigger_retraining))
}
