//! FraudGuard Core Module
//!
//! The core module owns the fraud model lifecycle: the hot-swappable model
//! holder and its reload loop, inference with request logging, weekly log
//! rotation, drift detection over incoming data partitions and the retraining
//! that publishes new model versions to the artifact store. Seeded synthetic
//! partitions drive the whole loop without real data.

pub mod config;
pub mod dataset;
pub mod drift;
pub mod error;
pub mod keys;
pub mod request_log;
pub mod schedule;
pub mod serving;
pub mod store;
pub mod synthetic;
pub mod training;

pub use config::{ResponseMode, SelectionPolicy, ServiceConfig, TriggerPolicy};
pub use drift::{DriftDetector, DriftReport, DriftWatchdog, WatchdogOutcome};
pub use error::{LifecycleError, Result};
pub use keys::{DataPartitionKey, ModelVersionKey};
pub use request_log::{RequestLog, RequestLogEntry, RequestLogRotator, RotationOutcome};
pub use schedule::{spawn_periodic, PeriodicTask};
pub use serving::{
    ActiveModel, FeatureRecord, FraudClass, InferenceService, ModelArtifact, ModelHolder,
    ModelReloader, Predictor, ScoredBatch,
};
pub use store::{ArtifactStore, InMemoryArtifactStore, LocalArtifactStore, StoreError};
pub use synthetic::{publish_partitions, GeneratorSettings, SyntheticPartition, WeeklyGenerator};
pub use training::{
    LogisticTrainingJob, PartitionSelection, RetrainJob, RetrainOrchestrator, RetrainStatus,
    TrainingJob, TriggerReason,
};
