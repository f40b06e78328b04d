//! Synthetic Partitions Module
//!
//! Seeded weekly partitions in the card transaction layout (`Time`,
//! `V1`..`V28`, `Amount`, `Class`) for exercising the drift watchdog and
//! retraining without real data. In a drift week the first five components
//! move by a shared offset, the next five are redrawn from a wide distribution,
//! amounts are inflated and the fraud rate jumps.

use std::collections::BTreeSet;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Exp, Normal};
use tracing::info;

use crate::dataset::{frame_from_rows, write_csv};
use crate::error::{LifecycleError, Result};
use crate::store::{join_key, ArtifactStore};

/// Number of anonymized `V` components per row
pub const COMPONENTS: usize = 28;

/// Label column written into every partition
pub const LABEL_COLUMN: &str = "Class";

/// Seed offset for picking drift weeks, so the pick does not consume row draws
const DRIFT_PICK_SALT: u64 = 0x5eed_d41f;

/// Shape of a generated year
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorSettings {
    pub weeks: u32,
    /// Inclusive bounds of the per-week row count
    pub min_rows: usize,
    pub max_rows: usize,
    pub fraud_ratio: f64,
    pub drift_fraud_ratio: f64,
    /// Mean of the exponential amount distribution
    pub mean_amount: f64,
    /// 1-based weeks that receive injected drift
    pub drift_weeks: BTreeSet<u32>,
    pub seed: u64,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            weeks: 52,
            min_rows: 80,
            max_rows: 150,
            fraud_ratio: 0.01,
            drift_fraud_ratio: 0.15,
            mean_amount: 100.0,
            drift_weeks: BTreeSet::new(),
            seed: 42,
        }
    }
}

impl GeneratorSettings {
    /// Replace the drift weeks with `count` distinct weeks drawn from the seed
    pub fn with_random_drift_weeks(mut self, count: usize) -> Self {
        let weeks = self.weeks as usize;
        let mut rng = StdRng::seed_from_u64(self.seed ^ DRIFT_PICK_SALT);
        self.drift_weeks = index::sample(&mut rng, weeks, count.min(weeks))
            .into_iter()
            .map(|i| i as u32 + 1)
            .collect();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.weeks == 0 {
            return Err(LifecycleError::Validation("weeks must be at least 1".into()));
        }
        if self.min_rows == 0 || self.min_rows > self.max_rows {
            return Err(LifecycleError::Validation(format!(
                "row bounds {}..={} are empty",
                self.min_rows, self.max_rows
            )));
        }
        for (name, ratio) in [
            ("fraud_ratio", self.fraud_ratio),
            ("drift_fraud_ratio", self.drift_fraud_ratio),
        ] {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(LifecycleError::Validation(format!(
                    "{} must be within [0, 1], got {}",
                    name, ratio
                )));
            }
        }
        if !(self.mean_amount.is_finite() && self.mean_amount > 0.0) {
            return Err(LifecycleError::Validation(format!(
                "mean_amount must be positive, got {}",
                self.mean_amount
            )));
        }
        if let Some(week) = self.drift_weeks.iter().find(|&&w| w == 0 || w > self.weeks) {
            return Err(LifecycleError::Validation(format!(
                "drift week {} is outside 1..={}",
                week, self.weeks
            )));
        }
        Ok(())
    }
}

/// Partition file name for a week; zero-padded so listings sort chronologically
pub fn partition_name(week: u32) -> String {
    format!("week_{:03}.csv", week)
}

/// Column names in file order, label excluded
pub fn feature_columns() -> Vec<String> {
    std::iter::once("Time".to_string())
        .chain((1..=COMPONENTS).map(|i| format!("V{}", i)))
        .chain(std::iter::once("Amount".to_string()))
        .collect()
}

/// One generated week, encoded as CSV
#[derive(Debug, Clone)]
pub struct SyntheticPartition {
    pub week: u32,
    pub name: String,
    pub rows: usize,
    pub fraud_rows: usize,
    pub drifted: bool,
    pub csv: Vec<u8>,
}

/// Seeded generator producing weeks from a single random stream
pub struct WeeklyGenerator {
    settings: GeneratorSettings,
    rng: StdRng,
    components: Normal<f64>,
    drifted_components: Normal<f64>,
    amount: Exp<f64>,
}

impl WeeklyGenerator {
    pub fn new(settings: GeneratorSettings) -> Result<Self> {
        settings.validate()?;
        let invalid = |e: String| LifecycleError::Validation(e);
        Ok(Self {
            rng: StdRng::seed_from_u64(settings.seed),
            components: Normal::new(0.0, 1.0).map_err(|e| invalid(e.to_string()))?,
            drifted_components: Normal::new(10.0, 5.0).map_err(|e| invalid(e.to_string()))?,
            amount: Exp::new(1.0 / settings.mean_amount).map_err(|e| invalid(e.to_string()))?,
            settings,
        })
    }

    pub fn settings(&self) -> &GeneratorSettings {
        &self.settings
    }

    /// Generate one week
    ///
    /// Output depends on the seed and on which weeks were generated before,
    /// so a full run is reproducible only when weeks are requested in order.
    pub fn generate_week(&mut self, week: u32) -> Result<SyntheticPartition> {
        let drifted = self.settings.drift_weeks.contains(&week);
        let fraud_ratio = if drifted {
            self.settings.drift_fraud_ratio
        } else {
            self.settings.fraud_ratio
        };
        let rows = self
            .rng
            .gen_range(self.settings.min_rows..=self.settings.max_rows);

        let mut values = Vec::with_capacity(rows);
        let mut labels = Vec::with_capacity(rows);
        for _ in 0..rows {
            let mut components: Vec<f64> = (0..COMPONENTS)
                .map(|_| self.components.sample(&mut self.rng))
                .collect();
            let mut amount = self.amount.sample(&mut self.rng);

            if drifted {
                let offset = self.rng.gen_range(8.0..12.0);
                for v in &mut components[..5] {
                    *v += offset;
                }
                for v in &mut components[5..10] {
                    *v = self.drifted_components.sample(&mut self.rng);
                }
                amount *= self.rng.gen_range(2.0..4.0);
            }

            let mut row = Vec::with_capacity(COMPONENTS + 2);
            row.push(Some(f64::from(week)));
            row.extend(components.into_iter().map(Some));
            row.push(Some(amount));
            values.push(row);
            labels.push(i64::from(self.rng.gen_bool(fraud_ratio)));
        }

        let fraud_rows = labels.iter().filter(|&&l| l == 1).count();
        let mut frame = frame_from_rows(&feature_columns(), &values, LABEL_COLUMN, &labels)?;
        Ok(SyntheticPartition {
            week,
            name: partition_name(week),
            rows,
            fraud_rows,
            drifted,
            csv: write_csv(&mut frame)?,
        })
    }

    /// Every configured week, in order
    pub fn generate_all(&mut self) -> Result<Vec<SyntheticPartition>> {
        (1..=self.settings.weeks)
            .map(|week| self.generate_week(week))
            .collect()
    }
}

/// Write partitions under `prefix`, waiting `interval` between consecutive writes
///
/// A zero interval publishes everything at once. Returns the written keys.
pub async fn publish_partitions(
    store: &dyn ArtifactStore,
    prefix: &str,
    partitions: Vec<SyntheticPartition>,
    interval: Duration,
) -> Result<Vec<String>> {
    let total = partitions.len();
    let mut keys = Vec::with_capacity(total);

    for (i, partition) in partitions.into_iter().enumerate() {
        if i > 0 && !interval.is_zero() {
            tokio::time::sleep(interval).await;
        }
        let key = join_key(prefix, &partition.name);
        store.put(&key, partition.csv).await?;
        info!(
            key = %key,
            rows = partition.rows,
            fraud_rows = partition.fraud_rows,
            drifted = partition.drifted,
            "Published partition {}/{}",
            i + 1,
            total
        );
        keys.push(key);
    }
    Ok(keys)
}
