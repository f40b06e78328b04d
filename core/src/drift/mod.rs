//! Drift detection
//!
//! [`DriftDetector`] is a pure comparison of two windows; [`DriftWatchdog`]
//! is the background loop that finds new partitions and decides whether to
//! retrain.

pub mod detector;
pub mod stats;
pub mod watchdog;

pub use detector::{DriftDetector, DriftReport, FeatureDrift, DEFAULT_ALPHA};
pub use watchdog::{new_partitions, DriftWatchdog, WatchdogOutcome, WatchdogPhase, WatchdogSettings};
