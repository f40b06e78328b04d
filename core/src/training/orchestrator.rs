//! Retrain orchestrator
//!
//! Runs one retraining end to end: select partitions, assemble the dataset,
//! run the training job on the blocking pool, publish the artifact folder.
//! The orchestrator never touches the model holder; a published model goes
//! live only when the reload loop discovers it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::ServiceConfig;
use crate::dataset::{concat_frames, read_csv, write_csv};
use crate::error::{LifecycleError, Result};
use crate::keys::{DataPartitionKey, ModelVersionKey};
use crate::store::{join_key, listing_prefix, ArtifactStore};
use crate::training::tracker::{ExperimentRun, ExperimentTracker};
use crate::training::{PartitionSelection, QualityMetrics, TrainedModel, TrainingJob, TrainingOutcome};

/// Experiment name used for tracked runs
pub const EXPERIMENT_NAME: &str = "fraud_detection";

/// Why a retraining was started
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerReason {
    Drift { features: BTreeSet<String> },
    NewData { partitions: Vec<DataPartitionKey> },
    Manual,
}

impl fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerReason::Drift { features } => {
                let names: Vec<&str> = features.iter().map(String::as_str).collect();
                write!(f, "drift detected in {}", names.join(", "))
            }
            TriggerReason::NewData { partitions } => {
                write!(f, "{} new partition(s)", partitions.len())
            }
            TriggerReason::Manual => f.write_str("manual"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RetrainStatus {
    Running,
    Succeeded,
    Failed,
}

/// One retraining attempt
#[derive(Debug, Clone, Serialize)]
pub struct RetrainJob {
    pub id: Uuid,
    pub reason: TriggerReason,
    pub inputs: Vec<DataPartitionKey>,
    pub status: RetrainStatus,
    /// Published model key on success
    pub produced: Option<ModelVersionKey>,
    pub metrics: Option<QualityMetrics>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RetrainJob {
    fn start(reason: TriggerReason, inputs: Vec<DataPartitionKey>) -> Self {
        Self {
            id: Uuid::new_v4(),
            reason,
            inputs,
            status: RetrainStatus::Running,
            produced: None,
            metrics: None,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    fn succeed(&mut self, key: ModelVersionKey, metrics: QualityMetrics) {
        self.status = RetrainStatus::Succeeded;
        self.produced = Some(key);
        self.metrics = Some(metrics);
        self.finished_at = Some(Utc::now());
    }

    fn fail(&mut self, reason: String) {
        self.status = RetrainStatus::Failed;
        self.error = Some(reason);
        self.finished_at = Some(Utc::now());
    }

    pub fn succeeded(&self) -> bool {
        self.status == RetrainStatus::Succeeded
    }
}

/// Where partitions are read from and models are published to
#[derive(Debug, Clone)]
pub struct RetrainSettings {
    pub partition_prefix: String,
    pub partition_suffix: String,
    pub model_prefix: String,
    pub model_suffix: String,
    pub selection: PartitionSelection,
    pub tracker_timeout: Duration,
}

impl RetrainSettings {
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self {
            partition_prefix: config.partition_prefix.clone(),
            partition_suffix: config.partition_suffix.clone(),
            model_prefix: config.model_prefix.clone(),
            model_suffix: config.model_suffix.clone(),
            selection: config.partition_selection(),
            tracker_timeout: config.tracker_timeout(),
        }
    }
}

pub struct RetrainOrchestrator {
    store: Arc<dyn ArtifactStore>,
    job: Arc<dyn TrainingJob>,
    tracker: Arc<dyn ExperimentTracker>,
    settings: RetrainSettings,
}

impl RetrainOrchestrator {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        job: Arc<dyn TrainingJob>,
        tracker: Arc<dyn ExperimentTracker>,
        settings: RetrainSettings,
    ) -> Self {
        Self {
            store,
            job,
            tracker,
            settings,
        }
    }

    pub fn settings(&self) -> &RetrainSettings {
        &self.settings
    }

    /// Every data partition currently in the store, sorted
    pub async fn available_partitions(&self) -> Result<Vec<DataPartitionKey>> {
        let keys = self
            .store
            .list(&listing_prefix(&self.settings.partition_prefix))
            .await?;
        Ok(keys
            .into_iter()
            .filter(|k| k.ends_with(&self.settings.partition_suffix))
            .map(DataPartitionKey::new)
            .collect())
    }

    /// List partitions, then retrain on the configured selection
    pub async fn retrain(&self, reason: TriggerReason) -> RetrainJob {
        match self.available_partitions().await {
            Ok(available) => self.retrain_from(reason, &available).await,
            Err(e) => {
                let mut job = RetrainJob::start(reason, Vec::new());
                error!(job_id = %job.id, error = %e, "Failed to list data partitions");
                job.fail(e.to_string());
                job
            }
        }
    }

    /// Retrain on the configured selection out of `available`
    ///
    /// Never returns an error: failures are recorded on the returned job and
    /// nothing is published.
    pub async fn retrain_from(&self, reason: TriggerReason, available: &[DataPartitionKey]) -> RetrainJob {
        let inputs = self.settings.selection.select(available);
        let mut job = RetrainJob::start(reason, inputs);
        info!(
            job_id = %job.id,
            reason = %job.reason,
            partitions = job.inputs.len(),
            trainer = self.job.name(),
            "Starting retraining"
        );

        match self.execute(&job.inputs).await {
            Ok((key, metrics)) => {
                info!(job_id = %job.id, key = %key, f1 = metrics.f1_score, "Retraining published a new model");
                job.succeed(key, metrics);
            }
            Err(e) => {
                error!(job_id = %job.id, error = %e, "Retraining failed, nothing published");
                job.fail(e.to_string());
            }
        }

        self.track(&job).await;
        job
    }

    async fn execute(&self, inputs: &[DataPartitionKey]) -> Result<(ModelVersionKey, QualityMetrics)> {
        if inputs.is_empty() {
            return Err(LifecycleError::Training("no data partitions available".to_string()));
        }
        let frame = self.load_frame(inputs).await?;
        let trained = self.run_job(frame).await?;
        let key = self.publish(&trained).await?;
        Ok((key, trained.metrics))
    }

    async fn load_frame(&self, inputs: &[DataPartitionKey]) -> Result<polars::prelude::DataFrame> {
        let mut frames = Vec::with_capacity(inputs.len());
        for key in inputs {
            let bytes = self.store.get(key.as_str()).await?;
            let frame = read_csv(bytes).map_err(|e| LifecycleError::Decode {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
            frames.push(frame);
        }
        concat_frames(&frames)
    }

    /// Run the job on the blocking pool; a panic becomes a failed outcome
    async fn run_job(&self, frame: polars::prelude::DataFrame) -> Result<TrainedModel> {
        let job = self.job.clone();
        match tokio::task::spawn_blocking(move || job.train(&frame)).await {
            Ok(TrainingOutcome::Succeeded(model)) => Ok(*model),
            Ok(TrainingOutcome::Failed { reason }) => Err(LifecycleError::Training(reason)),
            Err(e) if e.is_panic() => Err(LifecycleError::Training("training job panicked".to_string())),
            Err(e) => Err(LifecycleError::Training(e.to_string())),
        }
    }

    /// Write metrics and input example first, the model blob last
    async fn publish(&self, trained: &TrainedModel) -> Result<ModelVersionKey> {
        let existing = self
            .store
            .list(&listing_prefix(&self.settings.model_prefix))
            .await?;
        let latest = ModelVersionKey::latest(&existing, &self.settings.model_suffix);
        let key = ModelVersionKey::successor(
            &self.settings.model_prefix,
            &self.settings.model_suffix,
            Utc::now(),
            latest.as_ref(),
        );
        let folder = key.folder();

        let metrics = serde_json::to_vec_pretty(&trained.metrics)?;
        self.store.put(&join_key(folder, "metrics.json"), metrics).await?;

        let mut example = trained.input_example.clone();
        let example = write_csv(&mut example)?;
        self.store
            .put(&join_key(folder, "input_example.csv"), example)
            .await?;

        self.store.put(key.as_str(), trained.artifact.encode()?).await?;
        Ok(key)
    }

    async fn track(&self, job: &RetrainJob) {
        let run = ExperimentRun {
            run_id: job.id,
            experiment: EXPERIMENT_NAME.to_string(),
            job: self.job.name().to_string(),
            reason: job.reason.to_string(),
            inputs: job.inputs.iter().map(|k| k.to_string()).collect(),
            succeeded: job.succeeded(),
            metrics: job.metrics,
            model_key: job.produced.clone(),
            error: job.error.clone(),
            started_at: job.started_at,
            finished_at: job.finished_at.unwrap_or_else(Utc::now),
        };

        match tokio::time::timeout(self.settings.tracker_timeout, self.tracker.record_run(&run)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(job_id = %job.id, error = %e, "Experiment tracker failed"),
            Err(_) => warn!(job_id = %job.id, "Experiment tracker timed out"),
        }
    }
}
