//! Error types for tsa-rt
//!
//! [`RetrainError`] is the retraining taxonomy, [`CycleError`] wraps it with
//! the phase a cycle failed in, and [`ApiError`] maps both to HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::models::CyclePhase;

/// Retraining failure taxonomy
#[derive(Debug, Error)]
pub enum RetrainError {
    /// Pool or a stratum too small; nothing was mutated
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// Fit did not converge or produced degenerate output; nothing promoted
    #[error("Training failed: {0}")]
    TrainingFailure(String),

    /// Model registered but consumed samples could not be marked.
    /// Needs operator reconciliation, never retried automatically.
    #[error(
        "Partial commit: model version {version} registered for batch {batch_id} \
         but {sample_count} samples could not be marked used: {reason}"
    )]
    PartialCommit {
        version: i64,
        batch_id: Uuid,
        sample_count: usize,
        reason: String,
    },

    /// Another cycle holds the cycle guard
    #[error("A retraining cycle is already in progress")]
    CycleInProgress,

    /// Nothing has been deployed yet
    #[error("No model has been deployed yet")]
    NoDeployedModel,

    /// Cycle ran past its wall-clock budget and was abandoned
    #[error("Cycle exceeded its time budget of {0:?}")]
    Timeout(Duration),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(#[from] tsa_common::Error),
}

impl RetrainError {
    /// Transient storage trouble; safe to run the cycle again
    pub fn is_transient(&self) -> bool {
        matches!(self, RetrainError::Storage(e) if e.is_transient())
    }
}

/// A failed cycle with the context it failed in
#[derive(Debug, Error)]
#[error("Retraining cycle {cycle_id} failed in {phase:?} after {} ms: {source}", .elapsed.as_millis())]
pub struct CycleError {
    pub cycle_id: Uuid,
    pub phase: CyclePhase,
    pub elapsed: Duration,
    #[source]
    pub source: RetrainError,
}

impl CycleError {
    /// Whether the scheduler may re-run the cycle
    ///
    /// Only transient storage errors before any state was written qualify.
    pub fn is_retryable(&self) -> bool {
        self.source.is_transient()
            && matches!(self.phase, CyclePhase::Checking | CyclePhase::Fetching)
    }
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Malformed request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Request well-formed but semantically invalid, e.g. empty text (422)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Conflict (409), e.g. cycle already running
    #[error("Conflict: {0}")]
    Conflict(String),

    /// No deployed model to serve (503)
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Common error: {0}")]
    Common(#[from] tsa_common::Error),
}

impl From<RetrainError> for ApiError {
    fn from(err: RetrainError) -> Self {
        match err {
            RetrainError::NoDeployedModel => ApiError::ModelUnavailable(err.to_string()),
            RetrainError::CycleInProgress | RetrainError::InsufficientData(_) => {
                ApiError::Conflict(err.to_string())
            }
            RetrainError::Storage(e) => ApiError::Common(e),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<CycleError> for ApiError {
    fn from(err: CycleError) -> Self {
        err.source.into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Validation(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR", msg)
            }
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::ModelUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "MODEL_UNAVAILABLE", msg)
            }
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Common(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
