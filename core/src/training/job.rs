//! Logistic regression training job

use linfa::prelude::*;
use linfa_logistic::LogisticRegression;
use ndarray::{Array1, Array2, Axis};
use polars::prelude::DataFrame;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::info;

use crate::dataset::{frame_from_features, LabeledDataset};
use crate::serving::predictor::{ModelArtifact, Predictor};
use crate::training::{QualityMetrics, TrainedModel, TrainingJob, TrainingOutcome};

/// Below this many rows the model is evaluated on its training data
const MIN_ROWS_FOR_HOLDOUT: usize = 10;

/// Fits a standardised logistic regression with `linfa-logistic`
#[derive(Debug, Clone)]
pub struct LogisticTrainingJob {
    label_column: String,
    max_iterations: u64,
    holdout_fraction: f64,
    balance_classes: bool,
    seed: u64,
}

impl LogisticTrainingJob {
    pub fn new(label_column: impl Into<String>) -> Self {
        Self {
            label_column: label_column.into(),
            max_iterations: 150,
            holdout_fraction: 0.2,
            balance_classes: true,
            seed: 42,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: u64) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_holdout_fraction(mut self, fraction: f64) -> Self {
        self.holdout_fraction = fraction.clamp(0.0, 0.9);
        self
    }

    /// Oversample the minority class in the training rows (on by default)
    pub fn with_class_balancing(mut self, enabled: bool) -> Self {
        self.balance_classes = enabled;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn fit(&self, dataset: &LabeledDataset) -> Result<TrainedModel, String> {
        if dataset.is_empty() {
            return Err("no complete labeled rows".to_string());
        }
        if !has_both_classes(dataset.targets.iter().copied()) {
            return Err("training data contains a single class".to_string());
        }

        let (train_idx, eval_idx) = self.split(&dataset.targets);
        let (means, scales) = standardization(&dataset.records.select(Axis(0), &train_idx));

        let fit_idx = if self.balance_classes {
            self.oversample_minority(&train_idx, &dataset.targets)
        } else {
            train_idx.clone()
        };
        let train_x = dataset.records.select(Axis(0), &fit_idx);
        let train_y = dataset.targets.select(Axis(0), &fit_idx);
        let standardized = (&train_x - &means) / &scales;

        let fitted = LogisticRegression::default()
            .max_iterations(self.max_iterations)
            .fit(&Dataset::new(standardized.clone(), train_y.clone()))
            .map_err(|e| format!("logistic regression failed: {}", e))?;

        let mut weights = fitted.params().to_vec();
        let mut intercept = fitted.intercept();

        // The fitted sign depends on the library's class ordering; orient the
        // scorer so it rises with the positive class.
        let scores = standardized.dot(&Array1::from_vec(weights.clone())) + intercept;
        if mean_where(&scores, &train_y, 1) < mean_where(&scores, &train_y, 0) {
            weights.iter_mut().for_each(|w| *w = -*w);
            intercept = -intercept;
        }

        let artifact = ModelArtifact {
            feature_names: dataset.feature_names.clone(),
            means: means.to_vec(),
            scales: scales.to_vec(),
            weights,
            intercept,
        };
        artifact.validate()?;

        let eval_x = dataset.records.select(Axis(0), &eval_idx);
        let eval_y = dataset.targets.select(Axis(0), &eval_idx);
        let probabilities = artifact
            .predict_proba(&eval_x)
            .map_err(|e| e.to_string())?;
        let mut metrics = classification_metrics(&probabilities, &eval_y);
        metrics.training_rows = train_idx.len();
        metrics.evaluation_rows = eval_idx.len();

        let first_row: Vec<Option<f64>> = dataset.records.row(0).iter().map(|v| Some(*v)).collect();
        let input_example = frame_from_features(&dataset.feature_names, &[first_row])
            .map_err(|e| e.to_string())?;

        Ok(TrainedModel {
            artifact,
            metrics,
            input_example,
        })
    }

    /// Seeded holdout split, stratified by class
    ///
    /// Each class contributes `ceil(count * fraction)` rows to the holdout but
    /// always keeps at least one training row; a class with a single row stays
    /// entirely in training. Small data is evaluated on its training rows.
    fn split(&self, targets: &Array1<usize>) -> (Vec<usize>, Vec<usize>) {
        let n = targets.len();
        let all: Vec<usize> = (0..n).collect();
        if n < MIN_ROWS_FOR_HOLDOUT || self.holdout_fraction <= 0.0 {
            return (all.clone(), all);
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut train = Vec::with_capacity(n);
        let mut eval = Vec::new();
        for class in [0usize, 1] {
            let mut members: Vec<usize> = all.iter().copied().filter(|&i| targets[i] == class).collect();
            members.shuffle(&mut rng);
            let holdout = if members.len() < 2 {
                0
            } else {
                ((members.len() as f64 * self.holdout_fraction).ceil() as usize).min(members.len() - 1)
            };
            let (held, kept) = members.split_at(holdout);
            eval.extend_from_slice(held);
            train.extend_from_slice(kept);
        }
        if eval.is_empty() {
            return (all.clone(), all);
        }
        train.sort_unstable();
        eval.sort_unstable();
        (train, eval)
    }

    /// Training rows plus seeded draws (with replacement) from the minority
    /// class until both classes are equally represented
    fn oversample_minority(&self, train_idx: &[usize], targets: &Array1<usize>) -> Vec<usize> {
        let (positive, negative): (Vec<usize>, Vec<usize>) =
            train_idx.iter().copied().partition(|&i| targets[i] == 1);
        let (minority, majority) = if positive.len() < negative.len() {
            (positive, negative)
        } else {
            (negative, positive)
        };
        if minority.is_empty() || minority.len() == majority.len() {
            return train_idx.to_vec();
        }

        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(1));
        let mut balanced = train_idx.to_vec();
        balanced.extend(
            (0..majority.len() - minority.len()).filter_map(|_| minority.choose(&mut rng).copied()),
        );
        balanced
    }
}

impl TrainingJob for LogisticTrainingJob {
    fn name(&self) -> &str {
        "logistic_regression"
    }

    fn train(&self, data: &DataFrame) -> TrainingOutcome {
        let dataset = match LabeledDataset::from_frame(data, &self.label_column) {
            Ok(dataset) => dataset,
            Err(e) => return TrainingOutcome::failed(e.to_string()),
        };
        info!(
            rows = dataset.len(),
            features = dataset.feature_names.len(),
            "Starting logistic regression training"
        );

        match self.fit(&dataset) {
            Ok(model) => {
                info!(
                    accuracy = model.metrics.accuracy,
                    precision = model.metrics.precision,
                    recall = model.metrics.recall,
                    f1 = model.metrics.f1_score,
                    "Training completed"
                );
                TrainingOutcome::Succeeded(Box::new(model))
            }
            Err(reason) => TrainingOutcome::failed(reason),
        }
    }
}

fn has_both_classes(mut targets: impl Iterator<Item = usize>) -> bool {
    let Some(first) = targets.next() else {
        return false;
    };
    targets.any(|t| t != first)
}

/// Column means and standard deviations; constant columns get scale 1
fn standardization(records: &Array2<f64>) -> (Array1<f64>, Array1<f64>) {
    let means = records
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(records.ncols()));
    let scales = records
        .std_axis(Axis(0), 0.0)
        .mapv(|s| if s.is_finite() && s > 1e-12 { s } else { 1.0 });
    (means, scales)
}

fn mean_where(scores: &Array1<f64>, targets: &Array1<usize>, class: usize) -> f64 {
    let (sum, count) = scores
        .iter()
        .zip(targets)
        .filter(|(_, t)| **t == class)
        .fold((0.0, 0usize), |(s, c), (v, _)| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Accuracy, precision, recall and F1 of thresholded probabilities
pub fn classification_metrics(probabilities: &Array1<f64>, targets: &Array1<usize>) -> QualityMetrics {
    let (mut tp, mut fp, mut tn, mut fn_) = (0usize, 0usize, 0usize, 0usize);
    for (p, t) in probabilities.iter().zip(targets) {
        match (*p >= 0.5, *t == 1) {
            (true, true) => tp += 1,
            (true, false) => fp += 1,
            (false, false) => tn += 1,
            (false, true) => fn_ += 1,
        }
    }

    let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
    let precision = ratio(tp, tp + fp);
    let recall = ratio(tp, tp + fn_);
    let f1_score = if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    };

    QualityMetrics {
        accuracy: ratio(tp + tn, tp + fp + tn + fn_),
        precision,
        recall,
        f1_score,
        ..QualityMetrics::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::frame_from_rows;
    use ndarray::array;
    use rand::Rng;

    /// 1% fraud, separable on `Amount`
    fn rare_fraud_frame(rows: usize) -> DataFrame {
        let mut rng = StdRng::seed_from_u64(11);
        let names = vec!["Amount".to_string()];
        let mut values = Vec::new();
        let mut labels = Vec::new();
        for i in 0..rows {
            let fraud = i % 100 == 0;
            let amount = if fraud { 500.0 } else { 60.0 } + rng.gen_range(-20.0..20.0);
            values.push(vec![Some(amount)]);
            labels.push(i64::from(fraud));
        }
        frame_from_rows(&names, &values, "Class", &labels).unwrap()
    }

    #[test]
    fn test_holdout_is_stratified_for_rare_fraud() {
        let job = LogisticTrainingJob::new("Class");
        let targets = Array1::from_iter((0..1000).map(|i| usize::from(i % 100 == 0)));

        let (train, eval) = job.split(&targets);
        let held_fraud = eval.iter().filter(|&&i| targets[i] == 1).count();
        let kept_fraud = train.iter().filter(|&&i| targets[i] == 1).count();
        assert_eq!(held_fraud, 2);
        assert_eq!(kept_fraud, 8);
        assert_eq!(eval.len(), 200);
        assert_eq!(train.len() + eval.len(), 1000);
    }

    #[test]
    fn test_oversampling_balances_training_rows() {
        let job = LogisticTrainingJob::new("Class");
        let targets = Array1::from_iter((0..100).map(|i| usize::from(i % 10 == 0)));
        let train: Vec<usize> = (0..100).collect();

        let balanced = job.oversample_minority(&train, &targets);
        let fraud = balanced.iter().filter(|&&i| targets[i] == 1).count();
        assert_eq!(fraud, 90);
        assert_eq!(balanced.len(), 180);
    }

    #[test]
    fn test_rare_fraud_is_evaluated_and_recalled() {
        let TrainingOutcome::Succeeded(model) =
            LogisticTrainingJob::new("Class").train(&rare_fraud_frame(1000))
        else {
            panic!("training should succeed");
        };

        assert_eq!(model.metrics.evaluation_rows, 200);
        assert_eq!(model.metrics.training_rows, 800);
        assert!(model.metrics.recall > 0.99);
        assert!(model.metrics.precision > 0.0);
    }

    /// Fraud rows have large amounts; legitimate ones small amounts
    fn separable_frame(rows: usize) -> DataFrame {
        let mut rng = StdRng::seed_from_u64(3);
        let names = vec!["Amount".to_string(), "V1".to_string()];
        let mut values = Vec::new();
        let mut labels = Vec::new();
        for i in 0..rows {
            let fraud = i % 4 == 0;
            let amount = if fraud { 400.0 } else { 80.0 } + rng.gen_range(-30.0..30.0);
            values.push(vec![Some(amount), Some(rng.gen_range(-1.0..1.0))]);
            labels.push(i64::from(fraud));
        }
        frame_from_rows(&names, &values, "Class", &labels).unwrap()
    }

    #[test]
    fn test_trains_an_oriented_model_on_separable_data() {
        let job = LogisticTrainingJob::new("Class");
        let TrainingOutcome::Succeeded(model) = job.train(&separable_frame(80)) else {
            panic!("training should succeed");
        };

        assert_eq!(model.artifact.feature_names, vec!["Amount", "V1"]);
        assert!(model.metrics.accuracy > 0.9);
        assert_eq!(model.metrics.evaluation_rows, 16);
        assert_eq!(model.metrics.training_rows, 64);
        assert_eq!(model.input_example.height(), 1);

        let probs = model
            .artifact
            .predict_proba(&array![[420.0, 0.0], [70.0, 0.0]])
            .unwrap();
        assert!(probs[0] > 0.5);
        assert!(probs[1] < 0.5);
    }

    #[test]
    fn test_single_class_data_fails() {
        let names = vec!["Amount".to_string()];
        let rows = vec![vec![Some(1.0)], vec![Some(2.0)], vec![Some(3.0)]];
        let frame = frame_from_rows(&names, &rows, "Class", &[0, 0, 0]).unwrap();

        let outcome = LogisticTrainingJob::new("Class").train(&frame);
        assert!(matches!(outcome, TrainingOutcome::Failed { reason } if reason.contains("single class")));
    }

    #[test]
    fn test_missing_label_fails() {
        let names = vec!["Amount".to_string()];
        let rows = vec![vec![Some(1.0)], vec![Some(2.0)]];
        let frame = frame_from_rows(&names, &rows, "Target", &[0, 1]).unwrap();

        let outcome = LogisticTrainingJob::new("Class").train(&frame);
        assert!(matches!(outcome, TrainingOutcome::Failed { .. }));
    }

    #[test]
    fn test_classification_metrics() {
        let probs = array![0.9, 0.8, 0.2, 0.6, 0.1];
        let targets = array![1usize, 1, 1, 0, 0];
        let metrics = classification_metrics(&probs, &targets);

        assert!((metrics.accuracy - 0.6).abs() < 1e-12);
        assert!((metrics.precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((metrics.recall - 2.0 / 3.0).abs() < 1e-12);
        assert!((metrics.f1_score - 2.0 / 3.0).abs() < 1e-12);
    }
}
