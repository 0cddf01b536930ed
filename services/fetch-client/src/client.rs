//! Fetch client
//!
//! Full and ranged fetches for one series descriptor. Every request goes
//! through the shared limiter and the retry policy; the result is either a
//! value set or a `FetchError` value, never a panic.
//!
//! Attempt loop:
//! 1. take a limiter permit, send, release the permit
//! 2. transient failure (timeout, connection, 5xx, 429): sleep and retry
//!    while the attempt budget lasts; 429 waits at least the server hint
//! 3. any other 4xx: stop immediately
//! 4. a ranged query refused as a bad request: `RangeUnsupported`

use std::sync::Arc;
use tracing::{debug, warn};
use types::clock::Clock;
use types::errors::FetchError;
use types::period::{Period, PeriodKind};
use types::series::{SeriesDescriptor, SourceQuery};
use types::values::ValueSet;

use crate::limiter::RequestLimiter;
use crate::query::with_range;
use crate::retry::RetryPolicy;
use crate::upstream::{Upstream, UpstreamError};

pub struct FetchClient<U> {
    upstream: U,
    limiter: Arc<RequestLimiter>,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl<U: Upstream> FetchClient<U> {
    pub fn new(upstream: U, limiter: Arc<RequestLimiter>, retry: RetryPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            upstream,
            limiter,
            retry,
            clock,
        }
    }

    /// Entire published history of a series.
    pub async fn fetch_full(&self, descriptor: &SeriesDescriptor) -> Result<ValueSet, FetchError> {
        let kind = descriptor.frequency.period_kind();
        self.execute(descriptor, &descriptor.query, kind)
            .await
            .map_err(|(attempts, err)| failed(attempts, &err))
    }

    /// Periods at or after `since`, up to the current period.
    ///
    /// `RangeUnsupported` tells the caller to fall back to `fetch_full`.
    pub async fn fetch_since(&self, descriptor: &SeriesDescriptor, since: Period) -> Result<ValueSet, FetchError> {
        let range_unsupported = || FetchError::RangeUnsupported {
            query: descriptor.query.to_string(),
        };
        if !descriptor.supports_range {
            return Err(range_unsupported());
        }

        let kind = descriptor.frequency.period_kind();
        let until = Period::current(kind, self.clock.today());
        let ranged = with_range(&descriptor.query, since, until).ok_or_else(range_unsupported)?;

        match self.execute(descriptor, &ranged, kind).await {
            Ok(values) => Ok(values
                .into_iter()
                .filter(|(period, _)| *period >= since)
                .collect()),
            Err((_, err)) if err.is_rejection() => {
                debug!(series = %descriptor.id, error = %err, "ranged query rejected");
                Err(range_unsupported())
            }
            Err((attempts, err)) => Err(failed(attempts, &err)),
        }
    }

    /// Run one query under the retry policy. Errors carry the attempt count.
    async fn execute(
        &self,
        descriptor: &SeriesDescriptor,
        query: &SourceQuery,
        kind: PeriodKind,
    ) -> Result<ValueSet, (u32, UpstreamError)> {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let result = {
                let _permit = self
                    .limiter
                    .acquire(self.upstream.name())
                    .await
                    .map_err(|e| (attempts, UpstreamError::Connection(e.to_string())))?;
                self.upstream.query(query, kind).await
            };

            let err = match result {
                Ok(values) => {
                    debug!(series = %descriptor.id, attempts, points = values.len(), "fetched");
                    return Ok(values);
                }
                Err(err) => err,
            };

            if !err.is_transient() || !self.retry.allows_retry(attempts) {
                return Err((attempts, err));
            }

            let delay = self.retry.delay(attempts - 1, err.retry_hint());
            warn!(
                series = %descriptor.id,
                attempt = attempts,
                throttled = err.is_throttled(),
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "transient upstream failure, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

fn failed(attempts: u32, err: &UpstreamError) -> FetchError {
    FetchError::Failed {
        attempts,
        reason: err.to_string(),
    }
}
