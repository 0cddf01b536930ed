//! Vintage recorder behaviour against a store whose vintage appends fail.

use async_trait::async_trait;
use chrono::Utc;
use revision_engine::{diff, VintageDecision, VintageRecorder};
use rust_decimal::Decimal;
use series_store::{MemoryStore, StoreError, StoredSeries, VersionedStore};
use std::io;
use std::sync::Arc;
use types::clock::FixedClock;
use types::errors::TaskError;
use types::ids::SeriesId;
use types::series::SeriesMetadata;
use types::values::ValueSet;
use types::vintage::Vintage;

/// Delegates to a memory store but rejects every vintage append.
struct BrokenJournal {
    inner: MemoryStore,
}

#[async_trait]
impl VersionedStore for BrokenJournal {
    async fn get(&self, id: &SeriesId) -> Result<Option<StoredSeries>, StoreError> {
        self.inner.get(id).await
    }

    async fn metadata(&self, id: &SeriesId) -> Result<Option<SeriesMetadata>, StoreError> {
        self.inner.metadata(id).await
    }

    async fn put(
        &self,
        id: &SeriesId,
        values: &ValueSet,
        metadata: &SeriesMetadata,
    ) -> Result<(), StoreError> {
        self.inner.put(id, values, metadata).await
    }

    async fn record_outcome(
        &self,
        id: &SeriesId,
        metadata: &SeriesMetadata,
    ) -> Result<(), StoreError> {
        self.inner.record_outcome(id, metadata).await
    }

    async fn append_vintage(&self, _id: &SeriesId, _vintage: &Vintage) -> Result<(), StoreError> {
        Err(StoreError::Io(io::Error::new(io::ErrorKind::Other, "disk full")))
    }

    async fn vintages(&self, id: &SeriesId) -> Result<Vec<Vintage>, StoreError> {
        self.inner.vintages(id).await
    }
}

fn one_point(value: i64) -> ValueSet {
    vec![("2025-01".parse().unwrap(), Some(Decimal::new(value, 2)))]
        .into_iter()
        .collect()
}

#[tokio::test]
async fn append_failure_is_reported_not_raised() {
    let store = Arc::new(BrokenJournal {
        inner: MemoryStore::new(),
    });
    let recorder = VintageRecorder::new(Arc::clone(&store), Arc::new(FixedClock::new(Utc::now())));
    let id = SeriesId::new("PX_1");
    let old = one_point(54);
    let report = diff(&old, &one_point(56));

    let decision = recorder.record_if_needed(&id, &old, &report).await;
    match &decision {
        VintageDecision::WriteFailed { vintage, error } => {
            assert_eq!(vintage.superseded, old);
            assert!(!error.is_fatal());
            assert!(matches!(error, TaskError::VintageWriteFailed { .. }));
        }
        other => panic!("Expected WriteFailed, got {:?}", other),
    }
    assert!(decision.warning().is_some());
}

#[tokio::test]
async fn no_append_attempted_for_additions() {
    let store = Arc::new(BrokenJournal {
        inner: MemoryStore::new(),
    });
    let recorder = VintageRecorder::new(store, Arc::new(FixedClock::new(Utc::now())));
    let old = ValueSet::new();
    let report = diff(&old, &one_point(10));

    let decision = recorder.record_if_needed(&SeriesId::new("PX_1"), &old, &report).await;
    assert_eq!(decision, VintageDecision::NotNeeded);
}
