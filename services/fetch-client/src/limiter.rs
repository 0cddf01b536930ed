//! Global request limiter
//!
//! Two independent ceilings shared by every worker:
//! - a semaphore bounding requests outstanding at the upstream at once
//! - a token bucket per upstream bounding request rate
//!
//! A caller holds the returned permit for the duration of one HTTP request
//! and drops it before any backoff sleep.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Requests in flight at the upstream, across all workers.
    pub max_in_flight: usize,
    /// Burst size of the token bucket.
    pub burst: u32,
    /// Sustained requests per second.
    pub requests_per_second: f64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 8,
            burst: 10,
            requests_per_second: 5.0,
        }
    }
}

#[derive(Debug, Clone)]
struct Bucket {
    capacity: f64,
    tokens: f64,
    refill_rate: f64,
    last_update: Instant,
}

impl Bucket {
    fn new(capacity: u32, refill_rate: f64) -> Self {
        Self {
            capacity: capacity as f64,
            tokens: capacity as f64,
            refill_rate,
            last_update: Instant::now(),
        }
    }

    /// Take one token, or report how long until one is available.
    fn try_take(&mut self) -> Result<(), Duration> {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();

        // Refill tokens
        self.tokens = f64::min(self.capacity, self.tokens + elapsed * self.refill_rate);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else if self.refill_rate <= 0.0 {
            Err(Duration::from_secs(1))
        } else {
            Err(Duration::from_secs_f64((1.0 - self.tokens) / self.refill_rate))
        }
    }
}

/// Shared limiter. Clone the `Arc` into every fetch client.
pub struct RequestLimiter {
    in_flight: Arc<Semaphore>,
    buckets: DashMap<String, Bucket>,
    config: LimiterConfig,
}

impl RequestLimiter {
    pub fn new(config: LimiterConfig) -> Self {
        Self {
            in_flight: Arc::new(Semaphore::new(config.max_in_flight.max(1))),
            buckets: DashMap::new(),
            config,
        }
    }

    /// Wait for a rate token for `upstream`, then for an in-flight slot.
    pub async fn acquire(&self, upstream: &str) -> Result<OwnedSemaphorePermit, AcquireError> {
        loop {
            // Shard guard must be released before sleeping
            let wait = {
                let mut bucket = self
                    .buckets
                    .entry(upstream.to_string())
                    .or_insert_with(|| Bucket::new(self.config.burst.max(1), self.config.requests_per_second));
                match bucket.try_take() {
                    Ok(()) => None,
                    Err(wait) => Some(wait),
                }
            };
            match wait {
                None => break,
                Some(wait) => {
                    trace!(upstream, wait_ms = wait.as_millis() as u64, "rate limited locally");
                    tokio::time::sleep(wait).await;
                }
            }
        }

        Arc::clone(&self.in_flight).acquire_owned().await
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.in_flight.available_permits()
    }
}
