//! Model reload loop
//!
//! Each cycle lists the model prefix, picks the lexicographically greatest key
//! carrying the model suffix and, when it differs from the active version,
//! loads it and swaps it into the [`ModelHolder`]. The holder's version is the
//! "last successfully loaded" marker: a key that fails to load never becomes
//! active, so it is retried on the next cycle.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::keys::ModelVersionKey;
use crate::schedule::PeriodicTask;
use crate::serving::holder::{ActiveModel, ModelHolder};
use crate::serving::predictor::ModelArtifact;
use crate::store::{listing_prefix, ArtifactStore};

/// Result of one reload cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// No key under the model prefix carries the model suffix
    NoArtifacts,
    /// The newest key is already active
    Unchanged(ModelVersionKey),
    /// A newer key was loaded and activated
    Swapped {
        from: Option<ModelVersionKey>,
        to: ModelVersionKey,
    },
}

/// Polls the artifact store and hot-swaps newer models
pub struct ModelReloader {
    store: Arc<dyn ArtifactStore>,
    holder: Arc<ModelHolder>,
    model_prefix: String,
    model_suffix: String,
    interval: Duration,
}

impl ModelReloader {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        holder: Arc<ModelHolder>,
        model_prefix: impl Into<String>,
        model_suffix: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            holder,
            model_prefix: model_prefix.into(),
            model_suffix: model_suffix.into(),
            interval,
        }
    }

    /// Newest model key currently in the store
    pub async fn latest_key(&self) -> Result<Option<ModelVersionKey>> {
        let keys = self.store.list(&listing_prefix(&self.model_prefix)).await?;
        Ok(ModelVersionKey::latest(&keys, &self.model_suffix))
    }

    /// Fetch and decode one model artifact
    pub async fn load(&self, key: &ModelVersionKey) -> Result<ActiveModel> {
        let bytes = self.store.get(key.as_str()).await?;
        let artifact = ModelArtifact::decode(key.as_str(), &bytes)?;
        Ok(ActiveModel::new(key.clone(), Arc::new(artifact)))
    }

    /// Run one reload cycle
    pub async fn reload_once(&self) -> Result<ReloadOutcome> {
        let Some(latest) = self.latest_key().await? else {
            debug!(prefix = %self.model_prefix, "No model artifacts found");
            return Ok(ReloadOutcome::NoArtifacts);
        };

        let current = self.holder.version();
        if current.as_ref() == Some(&latest) {
            return Ok(ReloadOutcome::Unchanged(latest));
        }

        info!(key = %latest, "New model detected, reloading");
        let model = match self.load(&latest).await {
            Ok(model) => model,
            Err(e) => {
                warn!(key = %latest, error = %e, "Failed to load model, keeping current version");
                return Err(e);
            }
        };
        self.holder.replace(model);

        Ok(ReloadOutcome::Swapped {
            from: current,
            to: latest,
        })
    }
}

#[async_trait]
impl PeriodicTask for ModelReloader {
    fn name(&self) -> &'static str {
        "model-reload"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run_cycle(&self) -> anyhow::Result<()> {
        self.reload_once().await?;
        Ok(())
    }
}
