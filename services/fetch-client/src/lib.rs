//! Fetch Client
//!
//! Descriptor-driven acquisition of series values from a rate-limited
//! upstream statistical service.
//! - `client`: full and ranged fetches with retry/backoff
//! - `query`: period-range rewriting of source queries
//! - `retry`: exponential backoff schedule with jitter
//! - `limiter`: global in-flight ceiling plus per-upstream token buckets
//! - `upstream`: transport port and its error classification
//! - `sidra`: HTTP transport for SIDRA-style table endpoints

pub mod client;
pub mod limiter;
pub mod query;
pub mod retry;
pub mod sidra;
pub mod upstream;

pub use client::FetchClient;
pub use limiter::{LimiterConfig, RequestLimiter};
pub use retry::RetryPolicy;
pub use sidra::{SidraConfig, SidraUpstream};
pub use upstream::{Upstream, UpstreamError};
