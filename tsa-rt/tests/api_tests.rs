//! HTTP API integration tests

mod helpers;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::ServiceExt;

use helpers::Fixture;
use tsa_rt::services::RetrainRequest;
use tsa_rt::{build_router, AppState};

fn app_state(fx: &Fixture) -> AppState {
    AppState::new(fx.orchestrator.clone(), fx.event_bus.clone())
}

async fn send(state: AppState, request: Request<Body>) -> (StatusCode, Value) {
    let response = build_router(state).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Fixture with one trained and deployed model
async fn trained_fixture() -> Fixture {
    let fx = Fixture::new().await;
    fx.store.seed(20).await;
    fx.orchestrator.run_retraining_cycle(true).await.unwrap().unwrap();
    fx
}

/// TC-API-001: GET / reports service info
#[tokio::test]
async fn tc_api_001_root_returns_service_info() {
    let fx = Fixture::new().await;

    let (status, body) = send(app_state(&fx), get("/")).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].is_string());
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

/// TC-API-002: /health before any model is deployed
#[tokio::test]
async fn tc_api_002_health_without_model() {
    let fx = Fixture::new().await;

    let (status, body) = send(app_state(&fx), get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model_loaded"], false);
    assert_eq!(body["status"], "degraded");
    assert!(body["uptime_seconds"].is_u64());
}

/// TC-API-003: /predict without a deployed model is 503
#[tokio::test]
async fn tc_api_003_predict_without_model_is_unavailable() {
    let fx = Fixture::new().await;

    let (status, body) = send(
        app_state(&fx),
        post_json("/predict", json!({"text": "I love this"})),
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "MODEL_UNAVAILABLE");
}

/// TC-API-004: Empty text is a validation error
#[tokio::test]
async fn tc_api_004_empty_text_is_rejected() {
    let fx = trained_fixture().await;

    for text in ["", "   "] {
        let (status, body) =
            send(app_state(&fx), post_json("/predict", json!({ "text": text }))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{text:?}");
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    let (status, _) = send(app_state(&fx), post_json("/predict", json!({}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

/// TC-API-005: Single prediction with a deployed model
#[tokio::test]
async fn tc_api_005_predict_returns_sentiment() {
    let fx = trained_fixture().await;

    let (status, body) = send(
        app_state(&fx),
        post_json("/predict", json!({"text": "I absolutely love this product"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let sentiment = body["sentiment"].as_str().unwrap();
    assert!(["positive", "neutral", "negative"].contains(&sentiment));
    let confidence = body["confidence"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&confidence));
    assert_eq!(body["model_version"], 1);
    assert_eq!(body["text"], "I absolutely love this product");
}

/// TC-API-006: Batch prediction keeps order and length
#[tokio::test]
async fn tc_api_006_batch_predict() {
    let fx = trained_fixture().await;
    let texts = ["Great product!", "Terrible service", "It's okay"];

    let (status, body) = send(
        app_state(&fx),
        post_json("/predict/batch", json!({ "texts": texts })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let results = body.as_array().unwrap();
    assert_eq!(results.len(), 3);
    for (result, text) in results.iter().zip(texts) {
        assert_eq!(result["text"], text);
    }

    let (status, _) = send(
        app_state(&fx),
        post_json("/predict/batch", json!({ "texts": ["fine", " "] })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = send(
        app_state(&fx),
        post_json("/predict/batch", json!({ "texts": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

/// TC-API-007: /model/info lists deployed and recent versions
#[tokio::test]
async fn tc_api_007_model_info() {
    let fx = Fixture::new().await;
    let (status, body) = send(app_state(&fx), get("/model/info")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["deployed_model"].is_null());
    assert_eq!(body["recent_models"].as_array().unwrap().len(), 0);

    let fx = trained_fixture().await;
    let (status, body) = send(app_state(&fx), get("/model/info")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deployed_model"]["version"], 1);
    assert_eq!(body["deployed_model"]["is_deployed"], true);
    assert_eq!(body["recent_models"].as_array().unwrap().len(), 1);
}

/// TC-API-008: /health after a model is deployed
#[tokio::test]
async fn tc_api_008_health_with_model() {
    let fx = trained_fixture().await;

    let (status, body) = send(app_state(&fx), get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model_loaded"], true);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["model_version"], 1);
}

/// TC-API-009: /retrain/check exposes the trigger decision
#[tokio::test]
async fn tc_api_009_retrain_check() {
    let fx = Fixture::new().await;
    fx.store.seed(20).await;

    let (status, body) = send(app_state(&fx), get("/retrain/check")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["should_retrain"], true);
    assert_eq!(body["reason"], "interval_elapsed");
    assert_eq!(body["unused_samples"], 60);
    assert!(body["hours_since_last_train"].is_null());
    assert_eq!(body["cycle_running"], false);
}

/// TC-API-010: POST /retrain hands the request to the scheduler
#[tokio::test]
async fn tc_api_010_retrain_queues_request() {
    let fx = Fixture::new().await;
    let (tx, mut rx) = mpsc::channel(1);
    let state = app_state(&fx).with_retrain_sender(tx);

    let (status, body) = send(state.clone(), post_json("/retrain", json!({"force": true}))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "accepted");
    assert_eq!(rx.try_recv().unwrap(), RetrainRequest { force: true });

    // Channel full while the first request is pending
    let (status, _) = send(state.clone(), post_json("/retrain", json!({}))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let (status, body) = send(state, post_json("/retrain", json!({}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");
}

/// TC-API-011: POST /retrain without a body defaults to an unforced cycle
#[tokio::test]
async fn tc_api_011_retrain_without_body() {
    let fx = Fixture::new().await;
    let (tx, mut rx) = mpsc::channel(1);
    let state = app_state(&fx).with_retrain_sender(tx);

    let request = Request::builder()
        .method("POST")
        .uri("/retrain")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(state, request).await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(rx.try_recv().unwrap(), RetrainRequest { force: false });
}
