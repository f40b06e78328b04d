//! Drift watchdog
//!
//! Each cycle moves through `Scanning` (list partitions), `Comparing` (newest
//! newly arrived partition against the partitions preceding it) and, when the trigger policy
//! fires, `Triggering` (hand off to the retrain orchestrator), then returns to
//! `Idle`. The watermark is the full set of partition keys evaluated so far.

use async_trait::async_trait;
use polars::prelude::DataFrame;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{ServiceConfig, TriggerPolicy};
use crate::dataset::{concat_frames, read_csv};
use crate::drift::detector::{DriftDetector, DriftReport};
use crate::error::{LifecycleError, Result};
use crate::keys::DataPartitionKey;
use crate::schedule::PeriodicTask;
use crate::store::{listing_prefix, ArtifactStore};
use crate::training::{RetrainJob, RetrainOrchestrator, TriggerReason};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WatchdogPhase {
    Idle,
    Scanning,
    Comparing,
    Triggering,
}

impl WatchdogPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => WatchdogPhase::Scanning,
            2 => WatchdogPhase::Comparing,
            3 => WatchdogPhase::Triggering,
            _ => WatchdogPhase::Idle,
        }
    }
}

impl fmt::Display for WatchdogPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// What one watchdog cycle did
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WatchdogOutcome {
    NoNewPartitions,
    /// New data, but no prior partition to compare against
    InsufficientHistory { candidate: DataPartitionKey },
    NoDrift {
        candidate: DataPartitionKey,
        report: DriftReport,
    },
    Retrained {
        candidate: DataPartitionKey,
        /// Absent when the policy retrains on any new data
        report: Option<DriftReport>,
        job: Box<RetrainJob>,
    },
}

/// Keys in `current` that were not in `previous`
pub fn new_partitions(
    previous: &BTreeSet<DataPartitionKey>,
    current: &BTreeSet<DataPartitionKey>,
) -> BTreeSet<DataPartitionKey> {
    current.difference(previous).cloned().collect()
}

#[derive(Debug, Clone)]
pub struct WatchdogSettings {
    pub partition_prefix: String,
    pub partition_suffix: String,
    /// Number of prior partitions forming the reference window
    pub reference_window: usize,
    pub policy: TriggerPolicy,
    pub interval: Duration,
}

impl WatchdogSettings {
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self {
            partition_prefix: config.partition_prefix.clone(),
            partition_suffix: config.partition_suffix.clone(),
            reference_window: config.reference_window,
            policy: config.trigger_policy,
            interval: config.drift_check_interval(),
        }
    }
}

pub struct DriftWatchdog {
    store: Arc<dyn ArtifactStore>,
    detector: DriftDetector,
    orchestrator: Arc<RetrainOrchestrator>,
    settings: WatchdogSettings,
    watermark: Mutex<BTreeSet<DataPartitionKey>>,
    phase: AtomicU8,
}

impl DriftWatchdog {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        detector: DriftDetector,
        orchestrator: Arc<RetrainOrchestrator>,
        settings: WatchdogSettings,
    ) -> Self {
        Self {
            store,
            detector,
            orchestrator,
            settings,
            watermark: Mutex::new(BTreeSet::new()),
            phase: AtomicU8::new(WatchdogPhase::Idle as u8),
        }
    }

    pub fn phase(&self) -> WatchdogPhase {
        WatchdogPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    fn set_phase(&self, phase: WatchdogPhase) {
        debug!(phase = %phase, "Watchdog phase");
        self.phase.store(phase as u8, Ordering::Release);
    }

    /// Keys evaluated so far
    pub async fn watermark(&self) -> BTreeSet<DataPartitionKey> {
        self.watermark.lock().await.clone()
    }

    /// Run one full cycle and return to `Idle`
    pub async fn run_once(&self) -> Result<WatchdogOutcome> {
        let mut watermark = self.watermark.lock().await;
        self.set_phase(WatchdogPhase::Scanning);
        let result = self.cycle(&mut watermark).await;
        self.set_phase(WatchdogPhase::Idle);
        result
    }

    async fn cycle(&self, watermark: &mut BTreeSet<DataPartitionKey>) -> Result<WatchdogOutcome> {
        let current = self.list_partitions().await?;
        let new = new_partitions(watermark, &current);
        if new.is_empty() {
            *watermark = current;
            return Ok(WatchdogOutcome::NoNewPartitions);
        }
        info!(
            new = new.len(),
            keys = ?new.iter().map(|k| k.as_str()).collect::<Vec<_>>(),
            "New data partitions detected"
        );

        let ordered: Vec<DataPartitionKey> = current.iter().cloned().collect();
        // newest arrival; a late backfill is compared against the keys before it
        let Some(candidate) = new.iter().next_back().cloned() else {
            *watermark = current;
            return Ok(WatchdogOutcome::NoNewPartitions);
        };
        let prior: Vec<DataPartitionKey> = current.range(..&candidate).cloned().collect();

        let outcome = match self.settings.policy {
            TriggerPolicy::OnNewData => {
                self.set_phase(WatchdogPhase::Triggering);
                let reason = TriggerReason::NewData {
                    partitions: new.iter().cloned().collect(),
                };
                let job = self.orchestrator.retrain_from(reason, &ordered).await;
                WatchdogOutcome::Retrained {
                    candidate,
                    report: None,
                    job: Box::new(job),
                }
            }
            TriggerPolicy::OnDrift => {
                let skip = prior.len().saturating_sub(self.settings.reference_window);
                let reference_keys = &prior[skip..];
                if reference_keys.is_empty() {
                    info!(candidate = %candidate, "No reference partitions yet, skipping drift check");
                    WatchdogOutcome::InsufficientHistory { candidate }
                } else {
                    self.set_phase(WatchdogPhase::Comparing);
                    // a read failure returns here, before the watermark moves
                    let reference = self.load_window(reference_keys).await?;
                    let latest = self.load_window(std::slice::from_ref(&candidate)).await?;
                    let report = self.detector.evaluate(&reference, &latest);
                    self.trigger_on_drift(candidate, report, &ordered).await
                }
            }
        };

        *watermark = current;
        Ok(outcome)
    }

    async fn trigger_on_drift(
        &self,
        candidate: DataPartitionKey,
        report: DriftReport,
        available: &[DataPartitionKey],
    ) -> WatchdogOutcome {
        for feature in report.features.iter().filter(|f| f.flagged) {
            warn!(
                partition = %candidate,
                feature = %feature.feature,
                p_value = feature.p_value,
                threshold = report.adjusted_alpha,
                "Drift detected"
            );
        }
        if !report.triggered {
            info!(
                partition = %candidate,
                tested = report.features.len(),
                "No drift detected, skipping retraining"
            );
            return WatchdogOutcome::NoDrift { candidate, report };
        }

        self.set_phase(WatchdogPhase::Triggering);
        let reason = TriggerReason::Drift {
            features: report.flagged_features(),
        };
        let job = self.orchestrator.retrain_from(reason, available).await;
        WatchdogOutcome::Retrained {
            candidate,
            report: Some(report),
            job: Box::new(job),
        }
    }

    async fn list_partitions(&self) -> Result<BTreeSet<DataPartitionKey>> {
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

    async fn load_window(&self, keys: &[DataPartitionKey]) -> Result<DataFrame> {
        let mut frames = Vec::with_capacity(keys.len());
        for key in keys {
            let bytes = self.store.get(key.as_str()).await?;
            let frame = read_csv(bytes).map_err(|e| LifecycleError::Decode {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
            frames.push(frame);
        }
        concat_frames(&frames)
    }
}

#[async_trait]
impl PeriodicTask for DriftWatchdog {
    fn name(&self) -> &'static str {
        "drift-watchdog"
    }

    fn interval(&self) -> Duration {
        self.settings.interval
    }

    async fn run_cycle(&self) -> anyhow::Result<()> {
        match self.run_once().await? {
            WatchdogOutcome::Retrained { job, .. } if !job.succeeded() => {
                warn!(job_id = %job.id, "Retraining failed; waiting for new data");
            }
            outcome => debug!(?outcome, "Watchdog cycle finished"),
        }
        Ok(())
    }
}
