//! HTTP contract of the scoring API, exercised through the router in-process

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use fraudguard_api::{router, ApiState};
use fraudguard_core::{
    ActiveModel, InferenceService, ModelArtifact, ModelHolder, ModelVersionKey, RequestLog,
    ResponseMode,
};

const TOKEN: &str = "test-token";

struct Harness {
    state: Arc<ApiState>,
    log: Arc<RequestLog>,
    _dir: tempfile::TempDir,
}

/// Router state with an optional model scoring `Amount` only
fn harness(with_model: bool, token: Option<&str>, mode: ResponseMode) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let holder = Arc::new(ModelHolder::new());
    if with_model {
        let artifact = ModelArtifact {
            feature_names: vec!["Amount".to_string()],
            means: vec![100.0],
            scales: vec![10.0],
            weights: vec![2.0],
            intercept: 0.0,
        };
        holder.replace(ActiveModel::new(
            ModelVersionKey::new("model_backups/2024-01-01_00-00-model.pkl"),
            Arc::new(artifact),
        ));
    }
    let log = Arc::new(RequestLog::new(dir.path().join("requests.jsonl")));
    let inference = Arc::new(InferenceService::new(holder, log.clone(), 0.5));
    Harness {
        state: Arc::new(ApiState {
            inference,
            api_token: token.map(str::to_string),
            response_mode: mode,
        }),
        log,
        _dir: dir,
    }
}

fn predict_request(token: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/predict")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn send(state: &Arc<ApiState>, request: Request<Body>) -> (StatusCode, Value) {
    let response = router(state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn scoring_body() -> String {
    json!({"data": [{"Amount": 150.0}, {"Amount": 50.0}]}).to_string()
}

#[tokio::test]
async fn test_health_needs_no_model_and_no_token() {
    let h = harness(false, Some(TOKEN), ResponseMode::Label);
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();

    let (status, body) = send(&h.state, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));
}

#[tokio::test]
async fn test_predict_returns_labels() {
    let h = harness(true, Some(TOKEN), ResponseMode::Label);

    let (status, body) = send(&h.state, predict_request(Some(TOKEN), &scoring_body())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"class": ["Fraud", "No Fraud"]}));
    assert_eq!(h.log.pending().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_predict_returns_probabilities() {
    let h = harness(true, Some(TOKEN), ResponseMode::Probability);

    let (status, body) = send(&h.state, predict_request(Some(TOKEN), &scoring_body())).await;
    assert_eq!(status, StatusCode::OK);
    let probabilities = body["probability"].as_array().unwrap();
    assert_eq!(probabilities.len(), 2);
    assert!(probabilities[0].as_f64().unwrap() > 0.99);
    assert!(probabilities[1].as_f64().unwrap() < 0.01);
}

#[tokio::test]
async fn test_predict_rejects_missing_or_wrong_credential() {
    let h = harness(true, Some(TOKEN), ResponseMode::Label);

    for token in [None, Some("wrong")] {
        let (status, body) = send(&h.state, predict_request(token, &scoring_body())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["reason"], "unauthorized");
    }
    assert!(h.log.pending().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unconfigured_token_rejects_everything() {
    let h = harness(true, None, ResponseMode::Label);

    let (status, _) = send(&h.state, predict_request(Some(TOKEN), &scoring_body())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_credential_is_checked_before_the_body() {
    let h = harness(true, Some(TOKEN), ResponseMode::Label);

    let (status, _) = send(&h.state, predict_request(None, "{not json")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_malformed_and_empty_input_are_bad_requests() {
    let h = harness(true, Some(TOKEN), ResponseMode::Label);

    for body in ["{not json", r#"{"rows": []}"#, r#"{"data": []}"#, r#"{"data": [{"V1": 1.0}]}"#] {
        let (status, response) = send(&h.state, predict_request(Some(TOKEN), body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body: {}", body);
        assert_eq!(response["error"]["reason"], "bad_input");
    }
}

#[tokio::test]
async fn test_predict_without_model_is_unavailable() {
    let h = harness(false, Some(TOKEN), ResponseMode::Label);

    let (status, body) = send(&h.state, predict_request(Some(TOKEN), &scoring_body())).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["reason"], "model_unavailable");
}

#[tokio::test]
async fn test_model_endpoint_reports_active_version() {
    let h = harness(true, Some(TOKEN), ResponseMode::Label);
    let request = Request::builder()
        .uri("/model")
        .header(header::AUTHORIZATION, format!("Bearer {}", TOKEN))
        .body(Body::empty())
        .unwrap();

    let (status, body) = send(&h.state, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], "model_backups/2024-01-01_00-00-model.pkl");
    assert_eq!(body["features"], json!(["Amount"]));
}
