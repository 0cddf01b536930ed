//! File-backed versioned store
//!
//! One directory per series under `<root>/series/`. The current state lives in
//! `series.json` and is replaced by writing a temp file, fsyncing it and
//! renaming it over the old one; vintages go to `vintages.journal`.
//!
//! All filesystem work runs on the blocking pool. Writers to the same series
//! are serialized by a per-key async lock.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use types::ids::SeriesId;
use types::series::SeriesMetadata;
use types::values::ValueSet;
use types::vintage::Vintage;

use crate::journal::VintageJournal;
use crate::{stamp_metadata, StoreError, StoredSeries, VersionedStore};

const SERIES_FILE: &str = "series.json";
const JOURNAL_FILE: &str = "vintages.journal";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStoreConfig {
    pub root: PathBuf,
    /// zstd level for vintage payloads; `None` disables compression.
    #[serde(default = "default_compression")]
    pub vintage_compression: Option<i32>,
}

fn default_compression() -> Option<i32> {
    Some(3)
}

impl FileStoreConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            vintage_compression: default_compression(),
        }
    }
}

impl Default for FileStoreConfig {
    fn default() -> Self {
        Self::new("data/store")
    }
}

pub struct FileStore {
    config: FileStoreConfig,
    locks: DashMap<SeriesId, Arc<Mutex<()>>>,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `config.root`.
    pub fn open(config: FileStoreConfig) -> Result<Self, StoreError> {
        fs::create_dir_all(config.root.join("series"))?;
        info!(root = %config.root.display(), "file store opened");
        Ok(Self {
            config,
            locks: DashMap::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    fn series_dir(&self, id: &SeriesId) -> PathBuf {
        self.config.root.join("series").join(storage_key(id))
    }

    fn journal(&self, id: &SeriesId) -> VintageJournal {
        VintageJournal::new(
            self.series_dir(id).join(JOURNAL_FILE),
            self.config.vintage_compression,
        )
    }

    fn lock_for(&self, id: &SeriesId) -> Arc<Mutex<()>> {
        self.locks
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Filesystem-safe directory name for a series id.
///
/// Ids made only of `[A-Za-z0-9._-]` map to themselves. Anything else has the
/// offending characters replaced and a CRC32C suffix added so distinct ids
/// cannot collide.
pub fn storage_key(id: &SeriesId) -> String {
    let raw = id.as_str();
    let mut key: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if key.chars().all(|c| c == '.') {
        key = "_".repeat(key.len());
    }
    if key != raw {
        key = format!("{}-{:08x}", key, crc32c::crc32c(raw.as_bytes()));
    }
    key
}

// ── Blocking helpers ────────────────────────────────────────────────

fn read_series(dir: &Path, id: &SeriesId) -> Result<Option<StoredSeries>, StoreError> {
    let data = match fs::read(dir.join(SERIES_FILE)) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let stored: StoredSeries = serde_json::from_slice(&data)?;

    if let Some(expected) = &stored.metadata.content_hash {
        let actual = stored.values.content_hash();
        if &actual != expected {
            return Err(StoreError::IntegrityFailure {
                series: id.to_string(),
                expected: expected.clone(),
                actual,
            });
        }
    }
    Ok(Some(stored))
}

fn write_series(dir: &Path, stored: &StoredSeries) -> Result<(), StoreError> {
    fs::create_dir_all(dir)?;
    let data = serde_json::to_vec_pretty(stored)?;
    let path = dir.join(SERIES_FILE);
    let tmp_path = dir.join(format!("{}.tmp", SERIES_FILE));

    // Atomic write: write to tmp, fsync, rename
    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(&data)?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, &path)?;
    Ok(())
}

async fn blocking<T, F>(f: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
}

#[async_trait]
impl VersionedStore for FileStore {
    async fn get(&self, id: &SeriesId) -> Result<Option<StoredSeries>, StoreError> {
        let dir = self.series_dir(id);
        let id = id.clone();
        blocking(move || read_series(&dir, &id)).await
    }

    async fn metadata(&self, id: &SeriesId) -> Result<Option<SeriesMetadata>, StoreError> {
        Ok(self.get(id).await?.map(|stored| stored.metadata))
    }

    async fn put(
        &self,
        id: &SeriesId,
        values: &ValueSet,
        metadata: &SeriesMetadata,
    ) -> Result<(), StoreError> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let stored = StoredSeries {
            metadata: stamp_metadata(values, metadata),
            values: values.clone(),
        };
        let dir = self.series_dir(id);
        blocking(move || write_series(&dir, &stored)).await?;
        debug!(series = %id, points = values.len(), "series written");
        Ok(())
    }

    async fn record_outcome(
        &self,
        id: &SeriesId,
        metadata: &SeriesMetadata,
    ) -> Result<(), StoreError> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let dir = self.series_dir(id);
        let series_id = id.clone();
        let metadata = metadata.clone();
        blocking(move || {
            let values = read_series(&dir, &series_id)?
                .map(|stored| stored.values)
                .unwrap_or_default();
            let stored = StoredSeries {
                metadata: stamp_metadata(&values, &metadata),
                values,
            };
            write_series(&dir, &stored)
        })
        .await
    }

    async fn append_vintage(&self, id: &SeriesId, vintage: &Vintage) -> Result<(), StoreError> {
        let journal = self.journal(id);
        let vintage = vintage.clone();
        blocking(move || journal.append(&vintage).map_err(StoreError::from)).await?;
        debug!(series = %id, "vintage appended");
        Ok(())
    }

    async fn vintages(&self, id: &SeriesId) -> Result<Vec<Vintage>, StoreError> {
        let journal = self.journal(id);
        let readout = blocking(move || journal.read_all().map_err(StoreError::from)).await?;
        Ok(readout.vintages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use tempfile::TempDir;
    use types::report::ChangeReport;
    use types::series::LastOutcome;

    fn values(v: i64) -> ValueSet {
        vec![
            ("2025-01".parse().unwrap(), Some(Decimal::from(v))),
            ("2025-02".parse().unwrap(), None),
        ]
        .into_iter()
        .collect()
    }

    fn open(tmp: &TempDir) -> FileStore {
        FileStore::open(FileStoreConfig::new(tmp.path())).unwrap()
    }

    #[test]
    fn test_storage_key() {
        assert_eq!(storage_key(&SeriesId::new("PX_IPCA-1.2")), "PX_IPCA-1.2");

        let odd = storage_key(&SeriesId::new("a/b"));
        assert!(odd.starts_with("a_b-"));
        assert_ne!(odd, storage_key(&SeriesId::new("a:b")));
        assert!(storage_key(&SeriesId::new("..")).starts_with("__-"));
    }

    #[tokio::test]
    async fn test_put_get_roundtrip_across_reopen() {
        let tmp = TempDir::new().unwrap();
        let id = SeriesId::new("PX_1");
        let meta = SeriesMetadata {
            last_period: Some("2025-02".parse().unwrap()),
            ..Default::default()
        };
        open(&tmp).put(&id, &values(1), &meta).await.unwrap();

        let stored = open(&tmp).get(&id).await.unwrap().unwrap();
        assert_eq!(stored.values, values(1));
        assert_eq!(stored.metadata.last_period, meta.last_period);
        assert!(stored.metadata.content_hash.is_some());
        assert!(!tmp
            .path()
            .join("series/PX_1/series.json.tmp")
            .exists());
    }

    #[tokio::test]
    async fn test_unknown_series_is_none() {
        let tmp = TempDir::new().unwrap();
        let store = open(&tmp);
        assert!(store.get(&SeriesId::new("nope")).await.unwrap().is_none());
        assert!(store.vintages(&SeriesId::new("nope")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tampered_values_fail_integrity() {
        let tmp = TempDir::new().unwrap();
        let store = open(&tmp);
        let id = SeriesId::new("PX_1");
        store.put(&id, &values(1), &SeriesMetadata::default()).await.unwrap();

        let path = tmp.path().join("series/PX_1/series.json");
        let text = fs::read_to_string(&path).unwrap();
        let mut doc: serde_json::Value = serde_json::from_str(&text).unwrap();
        doc["values"]["2025-01"] = serde_json::Value::String("999".into());
        fs::write(&path, serde_json::to_vec(&doc).unwrap()).unwrap();

        match store.get(&id).await {
            Err(StoreError::IntegrityFailure { series, .. }) => assert_eq!(series, "PX_1"),
            other => panic!("Expected IntegrityFailure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_record_outcome_preserves_values() {
        let tmp = TempDir::new().unwrap();
        let store = open(&tmp);
        let id = SeriesId::new("PX_1");
        store.put(&id, &values(7), &SeriesMetadata::default()).await.unwrap();

        let meta = SeriesMetadata::default().with_attempt(LastOutcome::Failure, Utc::now());
        store.record_outcome(&id, &meta).await.unwrap();

        let stored = store.get(&id).await.unwrap().unwrap();
        assert_eq!(stored.values, values(7));
        assert_eq!(stored.metadata.last_outcome, Some(LastOutcome::Failure));
    }

    #[tokio::test]
    async fn test_vintage_history_persists() {
        let tmp = TempDir::new().unwrap();
        let id = SeriesId::new("PX_1");
        let first = Vintage::new(id.clone(), Utc::now(), values(1), ChangeReport::default());
        let second = Vintage::new(id.clone(), Utc::now(), values(2), ChangeReport::default());
        {
            let store = open(&tmp);
            store.append_vintage(&id, &first).await.unwrap();
            store.append_vintage(&id, &second).await.unwrap();
        }
        let history = open(&tmp).vintages(&id).await.unwrap();
        assert_eq!(history, vec![first, second]);
    }

    #[tokio::test]
    async fn test_concurrent_puts_to_distinct_series() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(open(&tmp));
        let mut handles = Vec::new();
        for i in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let id = SeriesId::new(format!("PX_{}", i));
                store.put(&id, &values(i), &SeriesMetadata::default()).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        for i in 0..8 {
            let stored = store.get(&SeriesId::new(format!("PX_{}", i))).await.unwrap().unwrap();
            assert_eq!(stored.values, values(i));
        }
    }
}
