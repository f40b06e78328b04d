//! In-memory artifact store

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{ArtifactStore, StoreError};

/// Artifact store backed by an ordered map
///
/// Cloning shares the underlying map, so a test can hold one handle while
/// the components under test hold another.
#[derive(Debug, Clone, Default)]
pub struct InMemoryArtifactStore {
    blobs: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs
    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }

    /// Remove a blob, returning it if present
    pub async fn remove(&self, key: &str) -> Option<Vec<u8>> {
        self.blobs.write().await.remove(key)
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let blobs = self.blobs.read().await;
        Ok(blobs
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.blobs
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        if key.is_empty() {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        self.blobs.write().await.insert(key.to_string(), bytes);
        Ok(())
    }
}
