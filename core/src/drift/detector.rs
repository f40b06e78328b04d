//! Drift detector
//!
//! Compares a reference window against a candidate window feature by feature
//! with Welch's t-test and a Bonferroni-adjusted threshold. Pure: no I/O.

use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::dataset::{numeric_columns, numeric_values};
use crate::drift::stats::welch_t_test;

/// Default family-wise significance level
pub const DEFAULT_ALPHA: f64 = 0.05;

/// Outcome of testing one feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureDrift {
    pub feature: String,
    pub p_value: f64,
    pub flagged: bool,
}

/// Result of one drift evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    /// Every feature that was actually tested, in column order
    pub features: Vec<FeatureDrift>,
    /// Shared numeric features left untested for lack of observations
    pub skipped: Vec<String>,
    /// Nominal level divided by the number of tested features
    pub adjusted_alpha: f64,
    pub triggered: bool,
}

impl DriftReport {
    pub fn tested(&self) -> Vec<&str> {
        self.features.iter().map(|f| f.feature.as_str()).collect()
    }

    /// Names of the flagged features; empty means no drift
    pub fn flagged_features(&self) -> BTreeSet<String> {
        self.features
            .iter()
            .filter(|f| f.flagged)
            .map(|f| f.feature.clone())
            .collect()
    }

    pub fn p_value(&self, feature: &str) -> Option<f64> {
        self.features
            .iter()
            .find(|f| f.feature == feature)
            .map(|f| f.p_value)
    }
}

#[derive(Debug, Clone)]
pub struct DriftDetector {
    alpha: f64,
    ignore: BTreeSet<String>,
}

impl Default for DriftDetector {
    fn default() -> Self {
        Self::new(DEFAULT_ALPHA)
    }
}

impl DriftDetector {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            ignore: BTreeSet::new(),
        }
    }

    /// Columns never tested, typically the label
    pub fn with_ignored<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Test every numeric feature present in both frames
    pub fn evaluate(&self, reference: &DataFrame, candidate: &DataFrame) -> DriftReport {
        let candidate_columns: BTreeSet<String> = numeric_columns(candidate).into_iter().collect();
        let samples = numeric_columns(reference)
            .into_iter()
            .filter(|name| candidate_columns.contains(name) && !self.ignore.contains(name))
            .filter_map(|name| {
                let reference_values = numeric_values(reference, &name)?;
                let candidate_values = numeric_values(candidate, &name)?;
                Some((name, reference_values, candidate_values))
            });
        self.evaluate_samples(samples)
    }

    /// Test pre-extracted samples: `(feature, reference values, candidate values)`
    ///
    /// Values must already exclude missing observations.
    pub fn evaluate_samples<I>(&self, samples: I) -> DriftReport
    where
        I: IntoIterator<Item = (String, Vec<f64>, Vec<f64>)>,
    {
        let mut tested = Vec::new();
        let mut skipped = Vec::new();
        for (feature, reference, candidate) in samples {
            match welch_t_test(&reference, &candidate) {
                Some(test) if !test.p_value.is_nan() => tested.push((feature, test.p_value)),
                _ => skipped.push(feature),
            }
        }

        let adjusted_alpha = if tested.is_empty() {
            self.alpha
        } else {
            self.alpha / tested.len() as f64
        };
        let features: Vec<FeatureDrift> = tested
            .into_iter()
            .map(|(feature, p_value)| FeatureDrift {
                feature,
                p_value,
                flagged: p_value < adjusted_alpha,
            })
            .collect();
        let triggered = features.iter().any(|f| f.flagged);

        DriftReport {
            features,
            skipped,
            adjusted_alpha,
            triggered,
        }
    }
}
