//! Component wiring
//!
//! Builds the shared lifecycle components once from a [`ServiceConfig`]. The
//! serving path, the background loops and the one-shot commands all borrow
//! from the same [`Components`], so they observe one holder, one request log
//! and one artifact store.

use std::sync::Arc;

use fraudguard_core::drift::WatchdogSettings;
use fraudguard_core::training::{RetrainSettings, StoreExperimentTracker};
use fraudguard_core::{
    ArtifactStore, DriftDetector, DriftWatchdog, InferenceService, LocalArtifactStore,
    LogisticTrainingJob, ModelHolder, ModelReloader, RequestLog, RequestLogRotator,
    RetrainOrchestrator, ServiceConfig,
};

use crate::cli::Result;

pub struct Components {
    pub config: ServiceConfig,
    pub store: Arc<dyn ArtifactStore>,
    pub holder: Arc<ModelHolder>,
    pub request_log: Arc<RequestLog>,
    pub inference: Arc<InferenceService>,
    pub reloader: Arc<ModelReloader>,
    pub rotator: Arc<RequestLogRotator>,
    pub orchestrator: Arc<RetrainOrchestrator>,
    pub watchdog: Arc<DriftWatchdog>,
}

impl Components {
    /// Wire everything against the local artifact store at `config.store_root`
    pub fn build(config: ServiceConfig) -> Result<Self> {
        let store: Arc<dyn ArtifactStore> = Arc::new(LocalArtifactStore::new(config.store_root.clone())?);
        Ok(Self::with_store(config, store))
    }

    /// Wire everything against an already constructed store
    pub fn with_store(config: ServiceConfig, store: Arc<dyn ArtifactStore>) -> Self {
        let holder = Arc::new(ModelHolder::new());
        let request_log = Arc::new(RequestLog::new(config.request_log_path.clone()));

        let inference = Arc::new(InferenceService::new(
            holder.clone(),
            request_log.clone(),
            config.decision_threshold,
        ));

        let reloader = Arc::new(ModelReloader::new(
            store.clone(),
            holder.clone(),
            config.model_prefix.clone(),
            config.model_suffix.clone(),
            config.reload_interval(),
        ));

        let rotator = Arc::new(RequestLogRotator::new(
            request_log.clone(),
            store.clone(),
            config.weekly_log_prefix.clone(),
            config.label_column.clone(),
            config.rotation_interval(),
        ));

        let orchestrator = Arc::new(RetrainOrchestrator::new(
            store.clone(),
            Arc::new(LogisticTrainingJob::new(config.label_column.clone())),
            Arc::new(StoreExperimentTracker::new(
                store.clone(),
                config.experiments_prefix.clone(),
            )),
            RetrainSettings::from_config(&config),
        ));

        let detector = DriftDetector::new(config.significance_level)
            .with_ignored(config.drift_ignore_columns.iter().cloned());
        let watchdog = Arc::new(DriftWatchdog::new(
            store.clone(),
            detector,
            orchestrator.clone(),
            WatchdogSettings::from_config(&config),
        ));

        Self {
            config,
            store,
            holder,
            request_log,
            inference,
            reloader,
            rotator,
            orchestrator,
            watchdog,
        }
    }
}
