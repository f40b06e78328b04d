//! Request log and weekly rotation
//!
//! Every scored record is appended to a local JSON Lines file. A rotation
//! task periodically uploads the accumulated entries to the artifact store as
//! a labeled CSV partition and then drops exactly the uploaded entries from
//! the local file. The log has its own lock, independent of the model holder.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::dataset::{frame_from_rows, write_csv};
use crate::error::Result;
use crate::schedule::PeriodicTask;
use crate::serving::inference::FraudClass;
use crate::serving::predictor::FeatureRecord;
use crate::store::{join_key, ArtifactStore};

/// One served record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestLogEntry {
    pub features: FeatureRecord,
    pub probability: f64,
    pub class: FraudClass,
    pub timestamp: DateTime<Utc>,
}

/// Append-only local log of served records
pub struct RequestLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl RequestLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append entries in order
    pub async fn append(&self, entries: &[RequestLogEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut buffer = Vec::new();
        for entry in entries {
            serde_json::to_writer(&mut buffer, entry)?;
            buffer.push(b'\n');
        }

        let _guard = self.lock.lock().await;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&buffer).await?;
        file.flush().await?;
        Ok(())
    }

    /// Entries not yet rotated
    pub async fn pending(&self) -> Result<Vec<RequestLogEntry>> {
        let bytes = self.snapshot().await?;
        Ok(parse_entries(&bytes))
    }

    /// Current contents of the log file
    pub async fn snapshot(&self) -> Result<Vec<u8>> {
        let _guard = self.lock.lock().await;
        self.read_file().await
    }

    /// Drop `uploaded` from the front of the log, keeping anything appended since
    ///
    /// If the file no longer starts with `uploaded` it is left untouched.
    pub async fn discard_prefix(&self, uploaded: &[u8]) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let current = self.read_file().await?;
        let Some(rest) = current.strip_prefix(uploaded) else {
            warn!(path = %self.path.display(), "Request log changed unexpectedly, not truncating");
            return Ok(false);
        };

        let temp = self.path.with_extension("rotating");
        tokio::fs::write(&temp, rest).await?;
        tokio::fs::rename(&temp, &self.path).await?;
        Ok(true)
    }

    async fn read_file(&self) -> Result<Vec<u8>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }
}

fn parse_entries(bytes: &[u8]) -> Vec<RequestLogEntry> {
    let mut entries = Vec::new();
    for (number, line) in bytes.split(|b| *b == b'\n').enumerate() {
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        match serde_json::from_slice::<RequestLogEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!(line = number + 1, error = %e, "Skipping malformed request log line"),
        }
    }
    entries
}

/// Encode entries as a CSV partition: one column per feature, then the label
fn entries_to_csv(entries: &[RequestLogEntry], label_column: &str) -> Result<Vec<u8>> {
    let names: Vec<String> = entries
        .iter()
        .flat_map(|e| e.features.keys().cloned())
        .filter(|name| name != label_column)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let rows: Vec<Vec<Option<f64>>> = entries
        .iter()
        .map(|e| names.iter().map(|n| e.features.get(n).copied()).collect())
        .collect();
    let labels: Vec<i64> = entries.iter().map(|e| e.class.label()).collect();

    let mut frame = frame_from_rows(&names, &rows, label_column, &labels)?;
    write_csv(&mut frame)
}

/// Result of one rotation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotationOutcome {
    /// Nothing to upload
    Empty,
    Uploaded { key: String, entries: usize },
}

/// Uploads the request log to `{prefix}/week_{year}_{week}.csv`
pub struct RequestLogRotator {
    log: Arc<RequestLog>,
    store: Arc<dyn ArtifactStore>,
    prefix: String,
    label_column: String,
    interval: Duration,
}

impl RequestLogRotator {
    pub fn new(
        log: Arc<RequestLog>,
        store: Arc<dyn ArtifactStore>,
        prefix: impl Into<String>,
        label_column: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            log,
            store,
            prefix: prefix.into(),
            label_column: label_column.into(),
            interval,
        }
    }

    /// Destination for a rotation at `now`, avoiding keys that already exist
    pub async fn destination(&self, now: DateTime<Utc>) -> Result<String> {
        let week = now.iso_week();
        let stem = format!("week_{}_{:02}", week.year(), week.week());
        let base = join_key(&self.prefix, &format!("{}.csv", stem));
        if !self.store.exists(&base).await? {
            return Ok(base);
        }

        let mut n = 1;
        loop {
            let key = join_key(&self.prefix, &format!("{}_{}.csv", stem, n));
            if !self.store.exists(&key).await? {
                return Ok(key);
            }
            n += 1;
        }
    }

    pub async fn rotate(&self) -> Result<RotationOutcome> {
        self.rotate_at(Utc::now()).await
    }

    /// Upload the current log; truncate only after the upload succeeded
    pub async fn rotate_at(&self, now: DateTime<Utc>) -> Result<RotationOutcome> {
        let snapshot = self.log.snapshot().await?;
        let entries = parse_entries(&snapshot);
        if entries.is_empty() {
            debug!("Request log empty, nothing to rotate");
            return Ok(RotationOutcome::Empty);
        }

        let csv = entries_to_csv(&entries, &self.label_column)?;
        let key = self.destination(now).await?;
        self.store.put(&key, csv).await?;
        self.log.discard_prefix(&snapshot).await?;

        info!(key = %key, entries = entries.len(), "Rotated request log");
        Ok(RotationOutcome::Uploaded {
            key,
            entries: entries.len(),
        })
    }
}

#[async_trait]
impl PeriodicTask for RequestLogRotator {
    fn name(&self) -> &'static str {
        "request-log-rotation"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run_cycle(&self) -> anyhow::Result<()> {
        self.rotate().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{numeric_values, read_csv};
    use crate::store::{InMemoryArtifactStore, StoreError};
    use chrono::TimeZone;

    fn entry(amount: f64, class: FraudClass) -> RequestLogEntry {
        RequestLogEntry {
            features: FeatureRecord::from([
                ("Amount".to_string(), amount),
                ("V1".to_string(), 0.5),
            ]),
            probability: if class == FraudClass::Fraud { 0.9 } else { 0.1 },
            class,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 17, 10, 0, 0).unwrap(),
        }
    }

    fn wednesday() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 17, 12, 0, 0).unwrap()
    }

    /// Store whose writes always fail
    struct UnreachableStore;

    #[async_trait]
    impl ArtifactStore for UnreachableStore {
        async fn list(&self, _prefix: &str) -> std::result::Result<Vec<String>, StoreError> {
            Ok(Vec::new())
        }

        async fn get(&self, key: &str) -> std::result::Result<Vec<u8>, StoreError> {
            Err(StoreError::NotFound(key.to_string()))
        }

        async fn put(&self, _key: &str, _bytes: Vec<u8>) -> std::result::Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    /// Store that appends to the log while an upload is in flight
    struct AppendingStore {
        inner: InMemoryArtifactStore,
        log: Arc<RequestLog>,
    }

    #[async_trait]
    impl ArtifactStore for AppendingStore {
        async fn list(&self, prefix: &str) -> std::result::Result<Vec<String>, StoreError> {
            self.inner.list(prefix).await
        }

        async fn get(&self, key: &str) -> std::result::Result<Vec<u8>, StoreError> {
            self.inner.get(key).await
        }

        async fn put(&self, key: &str, bytes: Vec<u8>) -> std::result::Result<(), StoreError> {
            self.log
                .append(&[entry(999.0, FraudClass::Fraud)])
                .await
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            self.inner.put(key, bytes).await
        }
    }

    fn rotator(log: &Arc<RequestLog>, store: Arc<dyn ArtifactStore>) -> RequestLogRotator {
        RequestLogRotator::new(
            log.clone(),
            store,
            "weekly_data",
            "Class",
            Duration::from_secs(604_800),
        )
    }

    #[tokio::test]
    async fn test_empty_log_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(RequestLog::new(dir.path().join("log.jsonl")));
        let store = InMemoryArtifactStore::new();

        let outcome = rotator(&log, Arc::new(store.clone()))
            .rotate_at(wednesday())
            .await
            .unwrap();
        assert_eq!(outcome, RotationOutcome::Empty);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_successful_rotation_uploads_csv_and_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(RequestLog::new(dir.path().join("log.jsonl")));
        log.append(&[entry(10.0, FraudClass::NoFraud), entry(500.0, FraudClass::Fraud)])
            .await
            .unwrap();
        let store = InMemoryArtifactStore::new();

        let outcome = rotator(&log, Arc::new(store.clone()))
            .rotate_at(wednesday())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            RotationOutcome::Uploaded {
                key: "weekly_data/week_2024_03.csv".to_string(),
                entries: 2
            }
        );
        assert!(log.snapshot().await.unwrap().is_empty());

        let frame = read_csv(store.get("weekly_data/week_2024_03.csv").await.unwrap()).unwrap();
        assert_eq!(numeric_values(&frame, "Amount"), Some(vec![10.0, 500.0]));
        assert_eq!(numeric_values(&frame, "Class"), Some(vec![0.0, 1.0]));
    }

    #[tokio::test]
    async fn test_failed_upload_leaves_log_byte_for_byte_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(RequestLog::new(dir.path().join("log.jsonl")));
        log.append(&[entry(10.0, FraudClass::NoFraud), entry(20.0, FraudClass::NoFraud)])
            .await
            .unwrap();
        let before = log.snapshot().await.unwrap();

        let result = rotator(&log, Arc::new(UnreachableStore))
            .rotate_at(wednesday())
            .await;
        assert!(result.is_err());
        assert_eq!(log.snapshot().await.unwrap(), before);
        assert_eq!(log.pending().await.unwrap().len(), 2);

        // a later, successful attempt uploads everything
        let store = InMemoryArtifactStore::new();
        let outcome = rotator(&log, Arc::new(store.clone()))
            .rotate_at(wednesday())
            .await
            .unwrap();
        assert!(matches!(outcome, RotationOutcome::Uploaded { entries: 2, .. }));
        assert!(log.pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_entries_appended_during_upload_survive() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(RequestLog::new(dir.path().join("log.jsonl")));
        log.append(&[entry(10.0, FraudClass::NoFraud)]).await.unwrap();
        let store = AppendingStore {
            inner: InMemoryArtifactStore::new(),
            log: log.clone(),
        };

        rotator(&log, Arc::new(store)).rotate_at(wednesday()).await.unwrap();

        let remaining = log.pending().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].features["Amount"], 999.0);
    }

    #[tokio::test]
    async fn test_destination_uses_iso_week_and_avoids_collisions() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(RequestLog::new(dir.path().join("log.jsonl")));
        let store = InMemoryArtifactStore::new();
        let rotator = rotator(&log, Arc::new(store.clone()));

        // 2021-01-01 belongs to ISO week 53 of 2020
        let new_year = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            rotator.destination(new_year).await.unwrap(),
            "weekly_data/week_2020_53.csv"
        );

        store.put("weekly_data/week_2024_03.csv", Vec::new()).await.unwrap();
        store.put("weekly_data/week_2024_03_1.csv", Vec::new()).await.unwrap();
        assert_eq!(
            rotator.destination(wednesday()).await.unwrap(),
            "weekly_data/week_2024_03_2.csv"
        );
    }

    #[tokio::test]
    async fn test_malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        let log = RequestLog::new(&path);
        log.append(&[entry(10.0, FraudClass::NoFraud)]).await.unwrap();
        let mut bytes = std::fs::read(&path).unwrap();
        bytes.extend_from_slice(b"{not json\n");
        std::fs::write(&path, bytes).unwrap();

        assert_eq!(log.pending().await.unwrap().len(), 1);
    }
}
