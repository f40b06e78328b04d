//! Model retraining
//!
//! A [`TrainingJob`] turns a labeled frame into a [`TrainedModel`]; the
//! [`RetrainOrchestrator`] selects partitions, runs the job in isolation and
//! publishes the result to the artifact store, where the reload loop picks it
//! up.

pub mod job;
pub mod orchestrator;
pub mod tracker;

pub use job::LogisticTrainingJob;
pub use orchestrator::{
    RetrainJob, RetrainOrchestrator, RetrainSettings, RetrainStatus, TriggerReason, EXPERIMENT_NAME,
};
pub use tracker::{ExperimentRun, ExperimentTracker, NoopTracker, StoreExperimentTracker};

use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};

use crate::keys::DataPartitionKey;
use crate::serving::predictor::ModelArtifact;

/// Which partitions a retraining consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionSelection {
    All,
    /// The `n` lexicographically greatest partitions
    MostRecent(usize),
}

impl PartitionSelection {
    /// Apply the policy to an arbitrary set of keys; the result is sorted
    pub fn select(&self, keys: &[DataPartitionKey]) -> Vec<DataPartitionKey> {
        let mut sorted = keys.to_vec();
        sorted.sort();
        sorted.dedup();
        match *self {
            PartitionSelection::All => sorted,
            PartitionSelection::MostRecent(n) => {
                let skip = sorted.len().saturating_sub(n);
                sorted.split_off(skip)
            }
        }
    }
}

/// Scalar quality metrics of a fitted model
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub training_rows: usize,
    pub evaluation_rows: usize,
}

/// Everything a successful training run produces
#[derive(Debug, Clone)]
pub struct TrainedModel {
    pub artifact: ModelArtifact,
    pub metrics: QualityMetrics,
    /// Representative input row (feature columns only)
    pub input_example: DataFrame,
}

/// Structured result of a training job
#[derive(Debug, Clone)]
pub enum TrainingOutcome {
    Succeeded(Box<TrainedModel>),
    Failed { reason: String },
}

impl TrainingOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        TrainingOutcome::Failed {
            reason: reason.into(),
        }
    }
}

/// A supervised learner. Runs on the blocking pool; must not assume a runtime.
pub trait TrainingJob: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Fit a model on `data`; failures are reported, not raised
    fn train(&self, data: &DataFrame) -> TrainingOutcome;
}
