//! Versioned Store
//!
//! Per-series key→value persistence for the update engine: the current value
//! set with its metadata, plus an append-only history of vintages.
//!
//! Guarantees are deliberately small:
//! - writes are atomic per key (a reader never observes a half-written series)
//! - no multi-key transactions
//! - vintages for one series are returned in append order
//!
//! # Implementations
//! - `MemoryStore`: `DashMap`-backed, for tests, dry runs and embedding
//! - `FileStore`: one directory per series; `series.json` replaced via
//!   temp-file + rename, `vintages.journal` of CRC32C-checked frames
//!
//! ```text
//! <root>/series/<key>/series.json       { metadata, values }
//! <root>/series/<key>/vintages.journal  [frame][frame]...
//! ```

pub mod file;
pub mod journal;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io;
use std::sync::Arc;
use thiserror::Error;
use types::ids::SeriesId;
use types::series::SeriesMetadata;
use types::values::ValueSet;
use types::vintage::Vintage;

pub use file::{FileStore, FileStoreConfig};
pub use journal::{JournalError, VintageJournal};
pub use memory::MemoryStore;

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Integrity check failed for {series}: expected {expected}, got {actual}")]
    IntegrityFailure {
        series: String,
        expected: String,
        actual: String,
    },

    #[error("Journal error: {0}")]
    Journal(#[from] JournalError),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

// ── Stored Series ───────────────────────────────────────────────────

/// The persisted state of one series.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSeries {
    pub metadata: SeriesMetadata,
    pub values: ValueSet,
}

// ── Store Port ──────────────────────────────────────────────────────

/// Abstract versioned store consumed by the update pipeline.
#[async_trait]
pub trait VersionedStore: Send + Sync {
    /// Current value set and metadata, `None` for a series never stored.
    async fn get(&self, id: &SeriesId) -> Result<Option<StoredSeries>, StoreError>;

    /// Metadata only; used during selection where values are not needed.
    async fn metadata(&self, id: &SeriesId) -> Result<Option<SeriesMetadata>, StoreError>;

    /// Atomically replace the value set and metadata of one series.
    async fn put(
        &self,
        id: &SeriesId,
        values: &ValueSet,
        metadata: &SeriesMetadata,
    ) -> Result<(), StoreError>;

    /// Replace metadata only, leaving stored values untouched.
    async fn record_outcome(&self, id: &SeriesId, metadata: &SeriesMetadata)
        -> Result<(), StoreError>;

    /// Append one vintage to the series history.
    async fn append_vintage(&self, id: &SeriesId, vintage: &Vintage) -> Result<(), StoreError>;

    /// Full vintage history in append order.
    async fn vintages(&self, id: &SeriesId) -> Result<Vec<Vintage>, StoreError>;
}

#[async_trait]
impl<S: VersionedStore + ?Sized> VersionedStore for Arc<S> {
    async fn get(&self, id: &SeriesId) -> Result<Option<StoredSeries>, StoreError> {
        (**self).get(id).await
    }

    async fn metadata(&self, id: &SeriesId) -> Result<Option<SeriesMetadata>, StoreError> {
        (**self).metadata(id).await
    }

    async fn put(
        &self,
        id: &SeriesId,
        values: &ValueSet,
        metadata: &SeriesMetadata,
    ) -> Result<(), StoreError> {
        (**self).put(id, values, metadata).await
    }

    async fn record_outcome(
        &self,
        id: &SeriesId,
        metadata: &SeriesMetadata,
    ) -> Result<(), StoreError> {
        (**self).record_outcome(id, metadata).await
    }

    async fn append_vintage(&self, id: &SeriesId, vintage: &Vintage) -> Result<(), StoreError> {
        (**self).append_vintage(id, vintage).await
    }

    async fn vintages(&self, id: &SeriesId) -> Result<Vec<Vintage>, StoreError> {
        (**self).vintages(id).await
    }
}

/// Metadata as it must be persisted next to `values`: content hash refreshed.
pub(crate) fn stamp_metadata(values: &ValueSet, metadata: &SeriesMetadata) -> SeriesMetadata {
    let mut stamped = metadata.clone();
    stamped.content_hash = Some(values.content_hash());
    stamped
}
