//! Service Configuration Module
//!
//! Configuration is layered: built-in defaults, then an optional TOML file,
//! then `FRAUDGUARD_*` environment variables.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "FRAUDGUARD";

/// Shape of a `/predict` response
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
    /// Per-record "Fraud" / "No Fraud"
    #[default]
    Label,
    /// Per-record fraud probability
    Probability,
}

/// What makes the watchdog start a retraining
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TriggerPolicy {
    /// Retrain only when the drift detector flags a feature
    #[default]
    OnDrift,
    /// Retrain whenever new partitions arrive
    OnNewData,
}

/// Which partitions a retraining consumes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    All,
    #[default]
    MostRecent,
}

/// Top-level service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Root directory of the local artifact store
    pub store_root: PathBuf,
    /// Prefix of published model artifacts
    pub model_prefix: String,
    /// File name suffix identifying a model blob
    pub model_suffix: String,
    /// Prefix for rotated request logs
    pub weekly_log_prefix: String,
    /// Prefix of labeled data partitions watched for drift
    pub partition_prefix: String,
    pub partition_suffix: String,
    /// Prefix for experiment run records
    pub experiments_prefix: String,
    /// Local request log file (JSON lines)
    pub request_log_path: PathBuf,
    pub reload_interval_secs: u64,
    pub drift_check_interval_secs: u64,
    pub rotation_interval_secs: u64,
    /// Number of prior partitions forming the drift reference window
    pub reference_window: usize,
    pub retrain_selection: SelectionPolicy,
    /// Partitions used by `most_recent` selection
    pub retrain_lookback: usize,
    pub trigger_policy: TriggerPolicy,
    /// Nominal family-wise significance level
    pub significance_level: f64,
    /// Fraud probability at or above which a record is labeled fraud
    pub decision_threshold: f64,
    pub response_mode: ResponseMode,
    /// Target column in partitions and rotated logs
    pub label_column: String,
    /// Numeric columns never tested for drift
    pub drift_ignore_columns: Vec<String>,
    /// Bearer credential required by scoring endpoints
    pub api_token: Option<String>,
    pub host: String,
    pub port: u16,
    /// Upper bound on a single experiment tracker call
    pub tracker_timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            store_root: PathBuf::from("./artifacts"),
            model_prefix: "model_backups".to_string(),
            model_suffix: "model.pkl".to_string(),
            weekly_log_prefix: "weekly_data".to_string(),
            partition_prefix: "dataset/weeks".to_string(),
            partition_suffix: ".csv".to_string(),
            experiments_prefix: "experiments".to_string(),
            request_log_path: PathBuf::from("./requests_log.jsonl"),
            reload_interval_secs: 300,
            drift_check_interval_secs: 300,
            rotation_interval_secs: 7 * 24 * 60 * 60,
            reference_window: 3,
            retrain_selection: SelectionPolicy::MostRecent,
            retrain_lookback: 4,
            trigger_policy: TriggerPolicy::OnDrift,
            significance_level: 0.05,
            decision_threshold: 0.5,
            response_mode: ResponseMode::Label,
            label_column: "Class".to_string(),
            drift_ignore_columns: vec!["Class".to_string(), "Time".to_string()],
            api_token: None,
            host: "0.0.0.0".to_string(),
            port: 8000,
            tracker_timeout_secs: 10,
        }
    }
}

impl ServiceConfig {
    /// Load defaults, then `file` (if given and present), then environment
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = file {
            debug!("Loading configuration file: {}", path.display());
            builder = builder.add_source(config::File::from(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("drift_ignore_columns"),
        );

        let config: ServiceConfig = builder
            .build()
            .context("Failed to assemble configuration sources")?
            .try_deserialize()
            .context("Failed to deserialize service configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make a loop or test meaningless
    pub fn validate(&self) -> Result<()> {
        if !(self.significance_level > 0.0 && self.significance_level < 1.0) {
            return Err(anyhow!(
                "significance_level must be in (0, 1), got {}",
                self.significance_level
            ));
        }
        if !(0.0..=1.0).contains(&self.decision_threshold) {
            return Err(anyhow!(
                "decision_threshold must be in [0, 1], got {}",
                self.decision_threshold
            ));
        }
        for (name, secs) in [
            ("reload_interval_secs", self.reload_interval_secs),
            ("drift_check_interval_secs", self.drift_check_interval_secs),
            ("rotation_interval_secs", self.rotation_interval_secs),
        ] {
            if secs == 0 {
                return Err(anyhow!("{} must be greater than zero", name));
            }
        }
        if self.reference_window == 0 {
            return Err(anyhow!("reference_window must be at least 1"));
        }
        if self.retrain_selection == SelectionPolicy::MostRecent && self.retrain_lookback == 0 {
            return Err(anyhow!("retrain_lookback must be at least 1"));
        }
        if self.model_suffix.is_empty() {
            return Err(anyhow!("model_suffix must not be empty"));
        }
        Ok(())
    }

    pub fn reload_interval(&self) -> Duration {
        Duration::from_secs(self.reload_interval_secs)
    }

    pub fn drift_check_interval(&self) -> Duration {
        Duration::from_secs(self.drift_check_interval_secs)
    }

    pub fn rotation_interval(&self) -> Duration {
        Duration::from_secs(self.rotation_interval_secs)
    }

    pub fn tracker_timeout(&self) -> Duration {
        Duration::from_secs(self.tracker_timeout_secs)
    }

    /// Retraining partition selection derived from the policy fields
    pub fn partition_selection(&self) -> crate::training::PartitionSelection {
        match self.retrain_selection {
            SelectionPolicy::All => crate::training::PartitionSelection::All,
            SelectionPolicy::MostRecent => {
                crate::training::PartitionSelection::MostRecent(self.retrain_lookback)
            }
        }
    }
}
