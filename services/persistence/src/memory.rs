//! In-memory versioned store
//!
//! Each map entry is replaced as a whole, so writes are atomic per key.

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;
use types::ids::SeriesId;
use types::series::SeriesMetadata;
use types::values::ValueSet;
use types::vintage::Vintage;

use crate::{stamp_metadata, StoreError, StoredSeries, VersionedStore};

#[derive(Debug, Default)]
pub struct MemoryStore {
    series: DashMap<SeriesId, StoredSeries>,
    vintages: DashMap<SeriesId, Vec<Vintage>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a series directly, bypassing the update pipeline.
    pub fn insert(&self, id: SeriesId, values: ValueSet, metadata: SeriesMetadata) {
        let metadata = stamp_metadata(&values, &metadata);
        self.series.insert(id, StoredSeries { metadata, values });
    }

    /// Number of series stored.
    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Number of vintages recorded for a series.
    pub fn vintage_count(&self, id: &SeriesId) -> usize {
        self.vintages.get(id).map(|v| v.len()).unwrap_or(0)
    }
}

#[async_trait]
impl VersionedStore for MemoryStore {
    async fn get(&self, id: &SeriesId) -> Result<Option<StoredSeries>, StoreError> {
        Ok(self.series.get(id).map(|entry| entry.value().clone()))
    }

    async fn metadata(&self, id: &SeriesId) -> Result<Option<SeriesMetadata>, StoreError> {
        Ok(self.series.get(id).map(|entry| entry.metadata.clone()))
    }

    async fn put(
        &self,
        id: &SeriesId,
        values: &ValueSet,
        metadata: &SeriesMetadata,
    ) -> Result<(), StoreError> {
        let metadata = stamp_metadata(values, metadata);
        self.series.insert(
            id.clone(),
            StoredSeries {
                metadata,
                values: values.clone(),
            },
        );
        debug!(series = %id, points = values.len(), "series stored");
        Ok(())
    }

    async fn record_outcome(
        &self,
        id: &SeriesId,
        metadata: &SeriesMetadata,
    ) -> Result<(), StoreError> {
        let mut entry = self.series.entry(id.clone()).or_default();
        let values = entry.values.clone();
        entry.metadata = stamp_metadata(&values, metadata);
        Ok(())
    }

    async fn append_vintage(&self, id: &SeriesId, vintage: &Vintage) -> Result<(), StoreError> {
        self.vintages
            .entry(id.clone())
            .or_default()
            .push(vintage.clone());
        Ok(())
    }

    async fn vintages(&self, id: &SeriesId) -> Result<Vec<Vintage>, StoreError> {
        Ok(self
            .vintages
            .get(id)
            .map(|v| v.value().clone())
            .unwrap_or_default())
    }
}
