//! Lifecycle error taxonomy
//!
//! Every fallible operation in the core returns [`LifecycleError`]. Background
//! loops catch these at their cycle boundary; the inference path maps them onto
//! the stable reason codes exposed by the API crate.

use crate::store::StoreError;

/// Errors raised by the model lifecycle components
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// Artifact store unreachable, partial read or failed write
    #[error("Artifact store error: {0}")]
    Store(#[from] StoreError),

    /// No model has ever been loaded successfully
    #[error("No model is available for scoring")]
    ModelUnavailable,

    /// Empty or malformed scoring input
    #[error("Invalid input: {0}")]
    Validation(String),

    /// A stored blob exists but cannot be decoded (corrupt or partial upload)
    #[error("Failed to decode '{key}': {reason}")]
    Decode { key: String, reason: String },

    /// Dataset could not be assembled from partitions
    #[error("Dataset error: {0}")]
    Data(String),

    /// The training job reported a failure
    #[error("Training failed: {0}")]
    Training(String),

    /// Local request log I/O
    #[error("Request log error: {0}")]
    RequestLog(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LifecycleError {
    /// Whether retrying on the next scheduled cycle can succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, LifecycleError::Store(e) if !e.is_not_found())
    }
}

impl From<polars::prelude::PolarsError> for LifecycleError {
    fn from(err: polars::prelude::PolarsError) -> Self {
        LifecycleError::Data(err.to_string())
    }
}

/// Result type for lifecycle operations
pub type Result<T> = std::result::Result<T, LifecycleError>;
