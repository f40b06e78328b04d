//! Hot-swappable model holder
//!
//! Readers take an `Arc` snapshot of the active model without locking;
//! `replace` publishes a fully constructed model with a single atomic pointer
//! store. Loading and decoding always happen before `replace` is called.

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

use crate::error::{LifecycleError, Result};
use crate::keys::ModelVersionKey;
use crate::serving::predictor::Predictor;

/// The model currently serving traffic
pub struct ActiveModel {
    pub version: ModelVersionKey,
    pub predictor: Arc<dyn Predictor>,
    pub loaded_at: DateTime<Utc>,
}

impl ActiveModel {
    pub fn new(version: ModelVersionKey, predictor: Arc<dyn Predictor>) -> Self {
        Self {
            version,
            predictor,
            loaded_at: Utc::now(),
        }
    }
}

impl std::fmt::Debug for ActiveModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveModel")
            .field("version", &self.version)
            .field("features", &self.predictor.feature_names().len())
            .field("loaded_at", &self.loaded_at)
            .finish()
    }
}

/// Owner of the single live [`ActiveModel`]
#[derive(Default)]
pub struct ModelHolder {
    active: ArcSwapOption<ActiveModel>,
}

impl ModelHolder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Immutable snapshot of the active model, if any has been loaded
    pub fn snapshot(&self) -> Option<Arc<ActiveModel>> {
        self.active.load_full()
    }

    /// Snapshot or `ModelUnavailable`
    pub fn require(&self) -> Result<Arc<ActiveModel>> {
        self.snapshot().ok_or(LifecycleError::ModelUnavailable)
    }

    /// Version of the active model
    pub fn version(&self) -> Option<ModelVersionKey> {
        self.snapshot().map(|m| m.version.clone())
    }

    /// Atomically make `model` the active one; returns the replaced model
    pub fn replace(&self, model: ActiveModel) -> Option<Arc<ActiveModel>> {
        let version = model.version.clone();
        let previous = self.active.swap(Some(Arc::new(model)));
        info!(
            version = %version,
            previous = previous.as_ref().map(|m| m.version.to_string()).unwrap_or_default(),
            "Activated model"
        );
        previous
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2};
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Predictor whose output is a fixed tag, so a reader can verify that the
    /// predictor it scored with belongs to the version it observed
    struct TaggedPredictor {
        names: Vec<String>,
        tag: f64,
    }

    impl Predictor for TaggedPredictor {
        fn feature_names(&self) -> &[String] {
            &self.names
        }

        fn predict_proba(&self, records: &Array2<f64>) -> Result<Array1<f64>> {
            Ok(Array1::from_elem(records.nrows(), self.tag))
        }
    }

    fn tagged(generation: u32) -> ActiveModel {
        ActiveModel::new(
            ModelVersionKey::new(format!("model_backups/{:06}/model.pkl", generation)),
            Arc::new(TaggedPredictor {
                names: vec!["Amount".to_string()],
                tag: f64::from(generation),
            }),
        )
    }

    #[test]
    fn test_empty_holder_is_unavailable() {
        let holder = ModelHolder::new();
        assert!(holder.snapshot().is_none());
        assert!(matches!(holder.require(), Err(LifecycleError::ModelUnavailable)));
        assert!(holder.version().is_none());
    }

    #[test]
    fn test_replace_returns_previous_and_snapshot_stays_valid() {
        let holder = ModelHolder::new();
        assert!(holder.replace(tagged(1)).is_none());

        let old_snapshot = holder.require().unwrap();
        let previous = holder.replace(tagged(2)).unwrap();

        assert_eq!(previous.version, old_snapshot.version);
        assert_eq!(
            holder.version().unwrap().as_str(),
            "model_backups/000002/model.pkl"
        );
        // the old snapshot is still fully usable after the swap
        let probs = old_snapshot
            .predictor
            .predict_proba(&Array2::zeros((1, 1)))
            .unwrap();
        assert_eq!(probs[0], 1.0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_readers_never_observe_mixed_versions() {
        let holder = Arc::new(ModelHolder::new());
        holder.replace(tagged(0));
        let stop = Arc::new(AtomicBool::new(false));

        let mut readers = Vec::new();
        for _ in 0..4 {
            let holder = holder.clone();
            let stop = stop.clone();
            readers.push(tokio::spawn(async move {
                let mut observed = 0u64;
                loop {
                    let snapshot = holder.require().unwrap();
                    let tag = snapshot
                        .predictor
                        .predict_proba(&Array2::zeros((1, 1)))
                        .unwrap()[0];
                    let expected = format!("model_backups/{:06}/model.pkl", tag as u32);
                    assert_eq!(snapshot.version.as_str(), expected);
                    observed += 1;
                    if stop.load(Ordering::Relaxed) {
                        break;
                    }
                    tokio::task::yield_now().await;
                }
                observed
            }));
        }

        let writer = {
            let holder = holder.clone();
            tokio::spawn(async move {
                for generation in 1..=500 {
                    holder.replace(tagged(generation));
                    tokio::task::yield_now().await;
                }
            })
        };

        writer.await.unwrap();
        stop.store(true, Ordering::Relaxed);
        for reader in readers {
            assert!(reader.await.unwrap() > 0);
        }
        assert_eq!(
            holder.version().unwrap().as_str(),
            "model_backups/000500/model.pkl"
        );
    }
}
