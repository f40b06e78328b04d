//! Model serving: the hot-swappable holder, the reload loop and inference

pub mod holder;
pub mod inference;
pub mod predictor;
pub mod reload;

pub use holder::{ActiveModel, ModelHolder};
pub use inference::{FraudClass, InferenceService, Prediction, ScoredBatch, DEFAULT_THRESHOLD};
pub use predictor::{FeatureRecord, ModelArtifact, Predictor};
pub use reload::{ModelReloader, ReloadOutcome};
