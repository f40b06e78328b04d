//! Artifact Store Module
//!
//! The lifecycle components only need three operations from a blob store:
//! list keys under a prefix, read a key, write a key. Keys are hierarchical
//! `/`-separated strings; listings are returned in lexicographic order.

use async_trait::async_trait;

pub mod local;
pub mod memory;

pub use local::LocalArtifactStore;
pub use memory::InMemoryArtifactStore;

/// Artifact store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Artifact not found: '{0}'")]
    NotFound(String),

    #[error("Invalid artifact key: '{0}'")]
    InvalidKey(String),

    #[error("I/O error on '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Blob store consumed by the reload loop, the request log rotation,
/// the drift watchdog and the retrain orchestrator
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// List every key starting with `prefix`, sorted lexicographically
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Read a blob
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Write (or overwrite) a blob
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError>;

    /// Whether a key is present
    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.list(key).await?.iter().any(|k| k == key))
    }
}

/// Join a prefix and a relative name into a store key
pub fn join_key(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix, name.trim_start_matches('/'))
    }
}

/// Prefix used for listing: always ends with `/` so `model` does not match `models/..`
pub fn listing_prefix(prefix: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        String::new()
    } else {
        format!("{}/", prefix)
    }
}
