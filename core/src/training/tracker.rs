//! Experiment tracking
//!
//! Tracking is best-effort: the orchestrator bounds every call with a timeout
//! and only warns when it fails.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::keys::{ModelVersionKey, MODEL_TIMESTAMP_FORMAT};
use crate::store::{join_key, ArtifactStore};
use crate::training::QualityMetrics;

/// Metadata of one retraining run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentRun {
    pub run_id: Uuid,
    pub experiment: String,
    pub job: String,
    pub reason: String,
    pub inputs: Vec<String>,
    pub succeeded: bool,
    pub metrics: Option<QualityMetrics>,
    pub model_key: Option<ModelVersionKey>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[async_trait]
pub trait ExperimentTracker: Send + Sync {
    async fn record_run(&self, run: &ExperimentRun) -> Result<()>;
}

/// Discards every run
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracker;

#[async_trait]
impl ExperimentTracker for NoopTracker {
    async fn record_run(&self, _run: &ExperimentRun) -> Result<()> {
        Ok(())
    }
}

/// Writes each run as JSON to `{prefix}/{experiment}/{started}-{run_id}.json`
pub struct StoreExperimentTracker {
    store: Arc<dyn ArtifactStore>,
    prefix: String,
}

impl StoreExperimentTracker {
    pub fn new(store: Arc<dyn ArtifactStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    pub fn key_for(&self, run: &ExperimentRun) -> String {
        join_key(
            &self.prefix,
            &format!(
                "{}/{}-{}.json",
                run.experiment,
                run.started_at.format(MODEL_TIMESTAMP_FORMAT),
                run.run_id.simple()
            ),
        )
    }
}

#[async_trait]
impl ExperimentTracker for StoreExperimentTracker {
    async fn record_run(&self, run: &ExperimentRun) -> Result<()> {
        let key = self.key_for(run);
        let body = serde_json::to_vec_pretty(run)?;
        self.store.put(&key, body).await?;
        debug!(key = %key, "Recorded experiment run");
        Ok(())
    }
}
