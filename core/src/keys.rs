//! Versioned artifact keys
//!
//! Model versions and data partitions are both named by store keys whose
//! lexicographic order matches their chronological order. All "newest"
//! decisions in the lifecycle are plain string maxima over these keys.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::store::join_key;

/// Zero-padded so lexical order equals chronological order
pub const MODEL_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Key of one stored model artifact
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelVersionKey(String);

impl ModelVersionKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lexicographically greatest key ending with `suffix`
    pub fn latest<'a, I>(keys: I, suffix: &str) -> Option<Self>
    where
        I: IntoIterator<Item = &'a String>,
    {
        keys.into_iter()
            .filter(|k| k.ends_with(suffix))
            .max()
            .map(|k| Self(k.clone()))
    }

    /// Key for a model published at `now`, strictly greater than `latest`
    ///
    /// Layout: `{prefix}/{timestamp}-Model/{suffix}`. When the clock is not
    /// ahead of the newest stored key, the new key is nested under that key's
    /// stem with a `~` separator, which sorts after every printable name.
    pub fn successor(
        prefix: &str,
        suffix: &str,
        now: DateTime<Utc>,
        latest: Option<&ModelVersionKey>,
    ) -> Self {
        let stamp = now.format(MODEL_TIMESTAMP_FORMAT).to_string();
        let candidate = Self(join_key(prefix, &format!("{}-Model/{}", stamp, suffix)));

        match latest {
            Some(latest) if candidate <= *latest => {
                let stem = latest.0.strip_suffix(suffix).unwrap_or(&latest.0);
                Self(format!("{}~{}-Model/{}", stem, stamp, suffix))
            }
            _ => candidate,
        }
    }

    /// Folder holding the model and its sibling artifacts
    pub fn folder(&self) -> &str {
        self.0.rsplit_once('/').map(|(folder, _)| folder).unwrap_or("")
    }
}

impl fmt::Display for ModelVersionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Key of one chronological batch of labeled data
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataPartitionKey(String);

impl DataPartitionKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DataPartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_latest_picks_lexicographic_max_with_suffix() {
        let keys = vec![
            "model_backups/2024-01-01_00-00-Model/model.pkl".to_string(),
            "model_backups/2024-03-01_00-00-Model/metrics.json".to_string(),
            "model_backups/2024-02-01_00-00-Model/model.pkl".to_string(),
            "model_backups/2023-12-31_23-59-Model/model.pkl".to_string(),
        ];

        let latest = ModelVersionKey::latest(&keys, "model.pkl").unwrap();
        assert_eq!(latest.as_str(), "model_backups/2024-02-01_00-00-Model/model.pkl");
        assert!(ModelVersionKey::latest(&Vec::<String>::new(), "model.pkl").is_none());
    }

    #[test]
    fn test_successor_uses_timestamp_layout() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 30, 5).unwrap();
        let key = ModelVersionKey::successor("model_backups", "model.pkl", now, None);
        assert_eq!(
            key.as_str(),
            "model_backups/2025-06-01_12-30-05-Model/model.pkl"
        );
        assert_eq!(key.folder(), "model_backups/2025-06-01_12-30-05-Model");
    }

    #[test]
    fn test_successor_is_strictly_greater_when_clock_lags() {
        let now = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        for existing in [
            "model_backups/2024-01-01_00-00-model.pkl",
            "model_backups/2030-01-01_00-00-00-Model/model.pkl",
        ] {
            let latest = ModelVersionKey::new(existing);
            let next = ModelVersionKey::successor("model_backups", "model.pkl", now, Some(&latest));
            assert!(next > latest, "{} should sort after {}", next, latest);
            assert!(next.as_str().ends_with("model.pkl"));
        }
    }

    #[test]
    fn test_successor_same_second_still_advances() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 30, 5).unwrap();
        let first = ModelVersionKey::successor("model_backups", "model.pkl", now, None);
        let second = ModelVersionKey::successor("model_backups", "model.pkl", now, Some(&first));
        assert!(second > first);
    }
}
