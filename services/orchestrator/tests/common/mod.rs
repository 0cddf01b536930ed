#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use orchestrator::{Fetcher, Orchestrator, Pipeline, RunConfig};
use rust_decimal::Decimal;
use scheduler::{FrequencyPolicy, StaticCatalog};
use series_store::MemoryStore;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use types::clock::{Clock, FixedClock};
use types::errors::FetchError;
use types::ids::{DatasetId, SeriesId};
use types::period::Period;
use types::series::{Frequency, Scope, SeriesDescriptor, SourceQuery};
use types::values::ValueSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Start(SeriesId),
    Finish(SeriesId),
}

/// Per-series scripted responses with an optional artificial latency.
#[derive(Default)]
pub struct FakeFetcher {
    responses: Mutex<HashMap<SeriesId, Result<ValueSet, FetchError>>>,
    delay: Duration,
    events: Mutex<Vec<Event>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeFetcher {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    pub fn respond(&self, id: &str, response: Result<ValueSet, FetchError>) {
        self.responses
            .lock()
            .unwrap()
            .insert(SeriesId::new(id), response);
    }

    pub fn fail(&self, id: &str) {
        self.respond(
            id,
            Err(FetchError::Failed {
                attempts: 5,
                reason: "HTTP 503".into(),
            }),
        );
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn started(&self) -> Vec<SeriesId> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Start(id) => Some(id),
                Event::Finish(_) => None,
            })
            .collect()
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Position of an event in the log.
    pub fn position(&self, event: &Event) -> usize {
        self.events()
            .iter()
            .position(|e| e == event)
            .unwrap_or_else(|| panic!("event {:?} never happened", event))
    }

    async fn respond_to(&self, descriptor: &SeriesDescriptor) -> Result<ValueSet, FetchError> {
        self.events
            .lock()
            .unwrap()
            .push(Event::Start(descriptor.id.clone()));
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.events
            .lock()
            .unwrap()
            .push(Event::Finish(descriptor.id.clone()));
        self.responses
            .lock()
            .unwrap()
            .get(&descriptor.id)
            .cloned()
            .unwrap_or_else(|| Ok(values(&[("2025-01", "0.16"), ("2025-02", "1.31")])))
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch_full(&self, descriptor: &SeriesDescriptor) -> Result<ValueSet, FetchError> {
        self.respond_to(descriptor).await
    }

    async fn fetch_since(
        &self,
        descriptor: &SeriesDescriptor,
        _since: Period,
    ) -> Result<ValueSet, FetchError> {
        self.respond_to(descriptor).await
    }
}

pub fn values(points: &[(&str, &str)]) -> ValueSet {
    points
        .iter()
        .map(|(p, v)| (p.parse().unwrap(), Some(Decimal::from_str(v).unwrap())))
        .collect()
}

pub fn descriptor(id: &str, dataset: &str, scope: Scope) -> SeriesDescriptor {
    let level = match scope {
        Scope::National => "n1",
        Scope::Regional => "n3",
    };
    SeriesDescriptor {
        id: SeriesId::new(id),
        dataset: DatasetId::new(dataset),
        frequency: Frequency::Monthly,
        scope,
        query: SourceQuery::new(format!("/t/1737/{}/all/v/63/p/all", level)),
        supports_range: true,
        label: None,
    }
}

/// Inside the primary window of the monthly price indices.
pub fn primary_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 17).unwrap()
}

pub fn clock() -> Arc<dyn Clock> {
    Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2025, 3, 17, 9, 0, 0).unwrap()))
}

pub fn run_config(concurrency: usize) -> RunConfig {
    RunConfig {
        concurrency,
        ..RunConfig::default()
    }
}

pub fn build(
    catalog: Vec<SeriesDescriptor>,
    fetcher: Arc<FakeFetcher>,
    store: Arc<MemoryStore>,
    config: RunConfig,
) -> Orchestrator<Arc<FakeFetcher>, Arc<MemoryStore>> {
    let pipeline = Pipeline::new(fetcher, store, clock(), config.dry_run);
    Orchestrator::new(
        Arc::new(StaticCatalog::new(catalog)),
        FrequencyPolicy::default(),
        pipeline,
        clock(),
        config,
    )
}
