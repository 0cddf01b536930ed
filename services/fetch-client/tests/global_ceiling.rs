//! The limiter bounds outstanding upstream requests across many clients.

use async_trait::async_trait;
use chrono::Utc;
use fetch_client::{FetchClient, LimiterConfig, RequestLimiter, RetryPolicy, Upstream, UpstreamError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use types::clock::FixedClock;
use types::ids::{DatasetId, SeriesId};
use types::period::PeriodKind;
use types::series::{Frequency, Scope, SeriesDescriptor, SourceQuery};
use types::values::ValueSet;

#[derive(Default)]
struct Slow {
    current: AtomicUsize,
    peak: AtomicUsize,
}

/// Local handle so the upstream trait can be implemented on shared state.
struct SlowUpstream(Arc<Slow>);

#[async_trait]
impl Upstream for SlowUpstream {
    fn name(&self) -> &str {
        "slow"
    }

    async fn query(&self, _query: &SourceQuery, _kind: PeriodKind) -> Result<ValueSet, UpstreamError> {
        let now = self.0.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.0.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.0.current.fetch_sub(1, Ordering::SeqCst);
        Ok(ValueSet::new())
    }
}

fn descriptor(i: usize) -> SeriesDescriptor {
    SeriesDescriptor {
        id: SeriesId::new(format!("PX_{}", i)),
        dataset: DatasetId::new("ipca"),
        frequency: Frequency::Monthly,
        scope: Scope::National,
        query: SourceQuery::new("/t/1/n1/all/v/1/p/all"),
        supports_range: true,
        label: None,
    }
}

#[tokio::test(start_paused = true)]
async fn outstanding_requests_never_exceed_ceiling() {
    let upstream = Arc::new(Slow::default());
    let limiter = Arc::new(RequestLimiter::new(LimiterConfig {
        max_in_flight: 3,
        burst: 1_000,
        requests_per_second: 10_000.0,
    }));
    let client = Arc::new(FetchClient::new(
        SlowUpstream(Arc::clone(&upstream)),
        limiter,
        RetryPolicy::default(),
        Arc::new(FixedClock::new(Utc::now())),
    ));

    let mut handles = Vec::new();
    for i in 0..20 {
        let client = Arc::clone(&client);
        handles.push(tokio::spawn(async move { client.fetch_full(&descriptor(i)).await }));
    }
    for h in handles {
        h.await.unwrap().unwrap();
    }

    assert_eq!(upstream.peak.load(Ordering::SeqCst), 3);
}
