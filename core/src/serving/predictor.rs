//! Scoring models and their stored encoding

use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{LifecycleError, Result};

/// One scoring input: feature name to value
pub type FeatureRecord = BTreeMap<String, f64>;

/// Anything that turns feature rows into fraud probabilities
pub trait Predictor: Send + Sync {
    /// Columns expected by `predict_proba`, in order
    fn feature_names(&self) -> &[String];

    /// Fraud probability for every row of `records`
    fn predict_proba(&self, records: &Array2<f64>) -> Result<Array1<f64>>;

    /// Arrange records into the matrix layout this predictor expects
    fn records_to_matrix(&self, records: &[FeatureRecord]) -> Result<Array2<f64>> {
        let names = self.feature_names();
        let mut flat = Vec::with_capacity(records.len() * names.len());
        for (row, record) in records.iter().enumerate() {
            for name in names {
                let value = record.get(name).ok_or_else(|| {
                    LifecycleError::Validation(format!("record {} is missing feature '{}'", row, name))
                })?;
                if !value.is_finite() {
                    return Err(LifecycleError::Validation(format!(
                        "record {} has a non-finite value for '{}'",
                        row, name
                    )));
                }
                flat.push(*value);
            }
        }
        Array2::from_shape_vec((records.len(), names.len()), flat)
            .map_err(|e| LifecycleError::Validation(e.to_string()))
    }
}

/// Serialized model: standardised logistic scorer
///
/// `p = sigmoid(intercept + sum_i weights[i] * (x[i] - means[i]) / scales[i])`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub feature_names: Vec<String>,
    pub means: Vec<f64>,
    pub scales: Vec<f64>,
    pub weights: Vec<f64>,
    pub intercept: f64,
}

impl ModelArtifact {
    /// Check internal consistency, e.g. after decoding
    pub fn validate(&self) -> std::result::Result<(), String> {
        let n = self.feature_names.len();
        if n == 0 {
            return Err("artifact has no features".to_string());
        }
        if self.means.len() != n || self.scales.len() != n || self.weights.len() != n {
            return Err(format!(
                "shape mismatch: {} features, {} means, {} scales, {} weights",
                n,
                self.means.len(),
                self.scales.len(),
                self.weights.len()
            ));
        }
        let finite = self
            .means
            .iter()
            .chain(&self.scales)
            .chain(&self.weights)
            .chain(std::iter::once(&self.intercept))
            .all(|v| v.is_finite());
        if !finite {
            return Err("artifact contains non-finite parameters".to_string());
        }
        if self.scales.iter().any(|s| *s <= 0.0) {
            return Err("artifact contains a non-positive scale".to_string());
        }
        Ok(())
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| LifecycleError::Decode {
            key: "<model artifact>".to_string(),
            reason: e.to_string(),
        })
    }

    /// Decode and validate a stored blob; `key` is used for diagnostics only
    pub fn decode(key: &str, bytes: &[u8]) -> Result<Self> {
        let artifact: ModelArtifact =
            bincode::deserialize(bytes).map_err(|e| LifecycleError::Decode {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
        artifact.validate().map_err(|reason| LifecycleError::Decode {
            key: key.to_string(),
            reason,
        })?;
        Ok(artifact)
    }

    fn score_row(&self, row: ArrayView1<f64>) -> f64 {
        let z = row
            .iter()
            .zip(&self.means)
            .zip(&self.scales)
            .zip(&self.weights)
            .fold(self.intercept, |acc, (((x, m), s), w)| acc + w * (x - m) / s);
        sigmoid(z)
    }
}

impl Predictor for ModelArtifact {
    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn predict_proba(&self, records: &Array2<f64>) -> Result<Array1<f64>> {
        if records.ncols() != self.feature_names.len() {
            return Err(LifecycleError::Validation(format!(
                "expected {} features, got {}",
                self.feature_names.len(),
                records.ncols()
            )));
        }
        Ok(records.rows().into_iter().map(|row| self.score_row(row)).collect())
    }
}

pub(crate) fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amount_model() -> ModelArtifact {
        ModelArtifact {
            feature_names: vec!["Amount".to_string()],
            means: vec![100.0],
            scales: vec![10.0],
            weights: vec![2.0],
            intercept: 0.0,
        }
    }

    fn record(amount: f64) -> FeatureRecord {
        let mut record = FeatureRecord::new();
        record.insert("Amount".to_string(), amount);
        record
    }

    #[test]
    fn test_encode_decode_preserves_artifact() {
        let model = amount_model();
        let bytes = model.encode().unwrap();
        assert_eq!(ModelArtifact::decode("k", &bytes).unwrap(), model);
    }

    #[test]
    fn test_decode_rejects_garbage_and_inconsistent_shapes() {
        assert!(matches!(
            ModelArtifact::decode("k", b"not a model"),
            Err(LifecycleError::Decode { .. })
        ));

        let mut broken = amount_model();
        broken.weights.push(1.0);
        let bytes = bincode::serialize(&broken).unwrap();
        assert!(matches!(
            ModelArtifact::decode("k", &bytes),
            Err(LifecycleError::Decode { .. })
        ));
    }

    #[test]
    fn test_predict_proba_is_monotonic_in_signal() {
        let model = amount_model();
        let matrix = model
            .records_to_matrix(&[record(80.0), record(100.0), record(300.0)])
            .unwrap();
        let probs = model.predict_proba(&matrix).unwrap();

        assert!(probs[0] < 0.5);
        assert!((probs[1] - 0.5).abs() < 1e-12);
        assert!(probs[2] > 0.99);
    }

    #[test]
    fn test_records_to_matrix_requires_every_feature() {
        let model = amount_model();
        let mut other = FeatureRecord::new();
        other.insert("V1".to_string(), 1.0);
        assert!(matches!(
            model.records_to_matrix(&[other]),
            Err(LifecycleError::Validation(_))
        ));
    }

    #[test]
    fn test_sigmoid_is_stable_for_large_inputs() {
        assert_eq!(sigmoid(1000.0), 1.0);
        assert_eq!(sigmoid(-1000.0), 0.0);
    }
}
