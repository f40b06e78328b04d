//! Inference service
//!
//! Scores a batch of records against one snapshot of the active model and
//! records every scored row in the request log.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{LifecycleError, Result};
use crate::keys::ModelVersionKey;
use crate::request_log::{RequestLog, RequestLogEntry};
use crate::serving::holder::ModelHolder;
use crate::serving::predictor::FeatureRecord;

/// Default fraud decision threshold
pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// Predicted class of one record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FraudClass {
    #[serde(rename = "Fraud")]
    Fraud,
    #[serde(rename = "No Fraud")]
    NoFraud,
}

impl FraudClass {
    /// Probability at or above `threshold` is fraud
    pub fn from_probability(probability: f64, threshold: f64) -> Self {
        if probability >= threshold {
            FraudClass::Fraud
        } else {
            FraudClass::NoFraud
        }
    }

    /// Value written to the label column of rotated logs
    pub fn label(self) -> i64 {
        match self {
            FraudClass::Fraud => 1,
            FraudClass::NoFraud => 0,
        }
    }
}

impl fmt::Display for FraudClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FraudClass::Fraud => f.write_str("Fraud"),
            FraudClass::NoFraud => f.write_str("No Fraud"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Prediction {
    pub probability: f64,
    pub class: FraudClass,
}

/// Result of scoring one request
#[derive(Debug, Clone, Serialize)]
pub struct ScoredBatch {
    /// Version that scored every record of the batch
    pub model_version: ModelVersionKey,
    pub predictions: Vec<Prediction>,
}

impl ScoredBatch {
    pub fn classes(&self) -> Vec<FraudClass> {
        self.predictions.iter().map(|p| p.class).collect()
    }

    pub fn probabilities(&self) -> Vec<f64> {
        self.predictions.iter().map(|p| p.probability).collect()
    }
}

/// Scores requests against the [`ModelHolder`]
pub struct InferenceService {
    holder: Arc<ModelHolder>,
    log: Arc<RequestLog>,
    threshold: f64,
}

impl InferenceService {
    pub fn new(holder: Arc<ModelHolder>, log: Arc<RequestLog>, threshold: f64) -> Self {
        Self {
            holder,
            log,
            threshold,
        }
    }

    pub fn holder(&self) -> &Arc<ModelHolder> {
        &self.holder
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Score a batch of records
    ///
    /// The model snapshot is taken once, so every record of the batch is
    /// scored by the same version even if a reload lands mid-request.
    /// Failing to append to the request log is logged and does not fail the
    /// request.
    pub async fn score(&self, records: &[FeatureRecord]) -> Result<ScoredBatch> {
        if records.is_empty() {
            return Err(LifecycleError::Validation("no records to score".to_string()));
        }

        let model = self.holder.require()?;
        let matrix = model.predictor.records_to_matrix(records)?;
        let probabilities = model.predictor.predict_proba(&matrix)?;

        let predictions: Vec<Prediction> = probabilities
            .iter()
            .map(|&probability| Prediction {
                probability,
                class: FraudClass::from_probability(probability, self.threshold),
            })
            .collect();

        debug!(
            version = %model.version,
            records = records.len(),
            "Scored request"
        );

        let timestamp = Utc::now();
        let entries: Vec<RequestLogEntry> = records
            .iter()
            .zip(&predictions)
            .map(|(record, prediction)| RequestLogEntry {
                features: record.clone(),
                probability: prediction.probability,
                class: prediction.class,
                timestamp,
            })
            .collect();
        if let Err(e) = self.log.append(&entries).await {
            warn!(error = %e, records = entries.len(), "Failed to append to request log");
        }

        Ok(ScoredBatch {
            model_version: model.version.clone(),
            predictions,
        })
    }
}
