//! Upstream transport port

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use types::period::PeriodKind;
use types::series::SourceQuery;
use types::values::ValueSet;

/// Failure of a single upstream request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("request timed out")]
    Timeout,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("HTTP {status}: {message}")]
    Status {
        status: u16,
        /// Parsed `Retry-After`, when the server sent one.
        retry_after: Option<Duration>,
        message: String,
    },

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl UpstreamError {
    /// Timeouts (either side), connection failures, throttling and 5xx are worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            UpstreamError::Timeout | UpstreamError::Connection(_) => true,
            UpstreamError::Status { status, .. } => matches!(*status, 408 | 429) || *status >= 500,
            UpstreamError::Malformed(_) => false,
        }
    }

    pub fn is_throttled(&self) -> bool {
        matches!(self, UpstreamError::Status { status: 429, .. })
    }

    /// Server-provided minimum wait before the next attempt.
    pub fn retry_hint(&self) -> Option<Duration> {
        match self {
            UpstreamError::Status { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// The upstream refused the query itself (bad request), not the load.
    pub fn is_rejection(&self) -> bool {
        matches!(self, UpstreamError::Status { status, .. } if *status == 400 || *status == 404 || *status == 422)
    }
}

/// A query-parameterized table endpoint returning (period, value) rows.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Short name used for rate-limit buckets and log fields.
    fn name(&self) -> &str;

    /// Run one query; periods are parsed at the granularity of `kind`.
    async fn query(&self, query: &SourceQuery, kind: PeriodKind) -> Result<ValueSet, UpstreamError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> UpstreamError {
        UpstreamError::Status {
            status: code,
            retry_after: None,
            message: String::new(),
        }
    }

    #[test]
    fn test_classification() {
        assert!(UpstreamError::Timeout.is_transient());
        assert!(UpstreamError::Connection("reset".into()).is_transient());
        assert!(status(503).is_transient());
        assert!(status(429).is_transient());
        assert!(status(429).is_throttled());
        assert!(!status(403).is_transient());
        assert!(status(408).is_transient());
        assert!(!status(408).is_throttled());
        assert!(!status(408).is_rejection());
        assert!(!UpstreamError::Malformed("x".into()).is_transient());
        assert!(status(400).is_rejection());
        assert!(!status(500).is_rejection());
    }
}
