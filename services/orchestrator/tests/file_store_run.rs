//! Two consecutive runs against the file-backed store.

mod common;

use common::*;
use orchestrator::{CancelToken, Orchestrator, Pipeline, RunStatus};
use scheduler::{FrequencyPolicy, StaticCatalog};
use series_store::{FileStore, FileStoreConfig, VersionedStore};
use std::sync::Arc;
use std::time::Duration;
use types::ids::SeriesId;
use types::series::{LastOutcome, Scope};

fn orchestrator(
    fetcher: Arc<FakeFetcher>,
    store: Arc<FileStore>,
) -> Orchestrator<Arc<FakeFetcher>, Arc<FileStore>> {
    let catalog = vec![
        descriptor("PX_IPCA_BR", "ipca", Scope::National),
        descriptor("PX_IPCA_RJ", "ipca", Scope::Regional),
    ];
    Orchestrator::new(
        Arc::new(StaticCatalog::new(catalog)),
        FrequencyPolicy::default(),
        Pipeline::new(fetcher, store, clock(), false),
        clock(),
        run_config(2),
    )
}

#[tokio::test]
async fn revision_on_second_run_is_archived_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let config = FileStoreConfig::new(dir.path());
    let fetcher = Arc::new(FakeFetcher::new(Duration::ZERO));

    let store = Arc::new(FileStore::open(config.clone()).unwrap());
    let first = orchestrator(Arc::clone(&fetcher), Arc::clone(&store))
        .run(primary_day(), CancelToken::never())
        .await;
    assert_eq!(first.status, RunStatus::Completed);
    assert_eq!(first.totals().updated, 2);
    assert!(first.revised.is_empty());

    // February is revised and March is published
    fetcher.respond(
        "PX_IPCA_BR",
        Ok(values(&[("2025-02", "1.32"), ("2025-03", "0.56")])),
    );
    let second = orchestrator(Arc::clone(&fetcher), Arc::clone(&store))
        .run(primary_day(), CancelToken::never())
        .await;
    assert_eq!(second.totals().updated, 1);
    assert_eq!(second.totals().unchanged, 1);
    assert_eq!(second.revised.len(), 1);
    assert_eq!(second.revised[0].series_id, SeriesId::new("PX_IPCA_BR"));
    drop(store);

    // Everything survives a reopen
    let reopened = FileStore::open(config).unwrap();
    let id = SeriesId::new("PX_IPCA_BR");
    let stored = reopened.get(&id).await.unwrap().unwrap();
    assert_eq!(
        stored.values,
        values(&[("2025-01", "0.16"), ("2025-02", "1.32"), ("2025-03", "0.56")])
    );
    assert_eq!(stored.metadata.last_outcome, Some(LastOutcome::Success));
    assert_eq!(stored.metadata.vintage_count, 1);

    let vintages = reopened.vintages(&id).await.unwrap();
    assert_eq!(vintages.len(), 1);
    assert_eq!(
        vintages[0].superseded,
        values(&[("2025-01", "0.16"), ("2025-02", "1.31")])
    );
    assert_eq!(vintages[0].report.changed.len(), 1);
    assert_eq!(vintages[0].report.added.len(), 1);
}
