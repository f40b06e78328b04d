//! API Handlers Module
//!
//! Request handlers for health, scoring and model introspection.

use axum::{
    debug_handler,
    extract::{rejection::JsonRejection, State},
    http::{header::AUTHORIZATION, HeaderMap},
    response::Json,
};
use std::sync::Arc;
use subtle::ConstantTimeEq;

use fraudguard_core::{InferenceService, ResponseMode};

use crate::models::{
    ApiError, ErrorReason, HealthResponse, ModelInfoResponse, PredictRequest, PredictResponse,
};

/// Represents the state of the API server
pub struct ApiState {
    /// Scoring against the active model
    pub inference: Arc<InferenceService>,
    /// Expected bearer token; `None` means nothing is authorized
    pub api_token: Option<String>,
    pub response_mode: ResponseMode,
}

/// Accept only `Authorization: Bearer <token>` matching the configured token
///
/// The comparison takes the same time wherever the first mismatch falls.
pub fn authorize(headers: &HeaderMap, expected: Option<&str>) -> Result<(), ApiError> {
    let Some(expected) = expected.filter(|t| !t.is_empty()) else {
        return Err(ApiError::unauthorized());
    };
    let presented = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim);

    match presented {
        Some(token) if bool::from(token.as_bytes().ct_eq(expected.as_bytes())) => Ok(()),
        _ => Err(ApiError::unauthorized()),
    }
}

/// Liveness check, independent of model state
#[debug_handler]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Score a batch of records
#[debug_handler]
pub async fn predict(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    body: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    authorize(&headers, state.api_token.as_deref())?;

    let Json(request) = body.map_err(|rejection| ApiError::bad_input(rejection.body_text()))?;
    tracing::debug!("Scoring {} records", request.data.len());

    let batch = state.inference.score(&request.data).await?;
    Ok(Json(PredictResponse::from_batch(&batch, state.response_mode)))
}

/// Version of the model currently serving traffic
#[debug_handler]
pub async fn model_info(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
) -> Result<Json<ModelInfoResponse>, ApiError> {
    authorize(&headers, state.api_token.as_deref())?;

    let Some(model) = state.inference.holder().snapshot() else {
        return Err(ApiError::new(
            ErrorReason::ModelUnavailable,
            "no model has been loaded yet",
        ));
    };
    Ok(Json(ModelInfoResponse {
        version: model.version.to_string(),
        loaded_at: model.loaded_at.to_rfc3339(),
        features: model.predictor.feature_names().to_vec(),
    }))
}
