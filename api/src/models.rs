//! API Models Module
//!
//! Request and response bodies of the HTTP surface, plus the structured error
//! returned by every failing endpoint.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use fraudguard_core::{FeatureRecord, FraudClass, LifecycleError, ResponseMode, ScoredBatch};

/// HTTP server settings
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    /// Bearer token accepted by scoring endpoints; `None` rejects every call
    pub api_token: Option<String>,
    pub response_mode: ResponseMode,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            api_token: None,
            response_mode: ResponseMode::Label,
        }
    }
}

/// Body of `POST /predict`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictRequest {
    pub data: Vec<FeatureRecord>,
}

/// Body of a successful `POST /predict`, shaped by the response mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PredictResponse {
    Labels { class: Vec<FraudClass> },
    Probabilities { probability: Vec<f64> },
}

impl PredictResponse {
    pub fn from_batch(batch: &ScoredBatch, mode: ResponseMode) -> Self {
        match mode {
            ResponseMode::Label => PredictResponse::Labels {
                class: batch.classes(),
            },
            ResponseMode::Probability => PredictResponse::Probabilities {
                probability: batch.probabilities(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Body of `GET /model`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfoResponse {
    pub version: String,
    pub loaded_at: String,
    pub features: Vec<String>,
}

/// Stable, machine-checkable failure reasons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorReason {
    Unauthorized,
    BadInput,
    ModelUnavailable,
    InternalError,
}

impl ErrorReason {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorReason::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorReason::BadInput => StatusCode::BAD_REQUEST,
            ErrorReason::ModelUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorReason::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub reason: ErrorReason,
    pub message: String,
}

/// `{"error": {"reason": ..., "message": ...}}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Error returned by handlers
#[derive(Debug, thiserror::Error)]
#[error("{reason:?}: {message}")]
pub struct ApiError {
    pub reason: ErrorReason,
    pub message: String,
}

impl ApiError {
    pub fn new(reason: ErrorReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }

    pub fn unauthorized() -> Self {
        Self::new(ErrorReason::Unauthorized, "missing or invalid credential")
    }

    pub fn bad_input(message: impl Into<String>) -> Self {
        Self::new(ErrorReason::BadInput, message)
    }
}

impl From<LifecycleError> for ApiError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::Validation(message) => ApiError::bad_input(message),
            LifecycleError::ModelUnavailable => {
                ApiError::new(ErrorReason::ModelUnavailable, "no model is available for scoring")
            }
            other => {
                tracing::error!("Inference failed: {}", other);
                ApiError::new(ErrorReason::InternalError, "internal error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                reason: self.reason,
                message: self.message,
            },
        };
        (self.reason.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_codes_and_statuses() {
        let cases = [
            (ErrorReason::Unauthorized, "\"unauthorized\"", 401),
            (ErrorReason::BadInput, "\"bad_input\"", 400),
            (ErrorReason::ModelUnavailable, "\"model_unavailable\"", 503),
            (ErrorReason::InternalError, "\"internal_error\"", 500),
        ];
        for (reason, json, status) in cases {
            assert_eq!(serde_json::to_string(&reason).unwrap(), json);
            assert_eq!(reason.status().as_u16(), status);
        }
    }

    #[test]
    fn test_lifecycle_errors_map_to_reasons() {
        let err: ApiError = LifecycleError::ModelUnavailable.into();
        assert_eq!(err.reason, ErrorReason::ModelUnavailable);

        let err: ApiError = LifecycleError::Validation("no records".to_string()).into();
        assert_eq!(err.reason, ErrorReason::BadInput);
        assert_eq!(err.message, "no records");

        let err: ApiError = LifecycleError::Training("boom".to_string()).into();
        assert_eq!(err.reason, ErrorReason::InternalError);
    }

    #[test]
    fn test_response_shapes() {
        let labels = PredictResponse::Labels {
            class: vec![FraudClass::Fraud, FraudClass::NoFraud],
        };
        assert_eq!(
            serde_json::to_string(&labels).unwrap(),
            r#"{"class":["Fraud","No Fraud"]}"#
        );

        let probabilities = PredictResponse::Probabilities {
            probability: vec![0.25],
        };
        assert_eq!(
            serde_json::to_string(&probabilities).unwrap(),
            r#"{"probability":[0.25]}"#
        );
    }
}
