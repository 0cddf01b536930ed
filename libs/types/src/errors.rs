//! Error taxonomy for per-series update work
//!
//! Every error here is local to one update task. The orchestrator records
//! them in the run report; none of them aborts a batch.

use thiserror::Error;

/// Outcome of a fetch that did not produce a value set.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The source cannot honor a range restriction for this query.
    /// Callers fall back to a full fetch; this is not a failure.
    #[error("Range-restricted query unsupported: {query}")]
    RangeUnsupported { query: String },

    /// Retries exhausted or a non-retryable rejection.
    #[error("Fetch failed after {attempts} attempt(s): {reason}")]
    Failed { attempts: u32, reason: String },
}

impl FetchError {
    pub fn is_range_unsupported(&self) -> bool {
        matches!(self, FetchError::RangeUnsupported { .. })
    }
}

/// Terminal or degraded conditions of one update task.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// Terminal; stored values and last period are left untouched.
    #[error("Fetch failed after {attempts} attempt(s): {reason}")]
    FetchFailed { attempts: u32, reason: String },

    /// Terminal; treated like a fetch failure.
    #[error("Store write failed: {reason}")]
    StoreWriteFailed { reason: String },

    /// Terminal; the previous version could not be loaded, so nothing is merged.
    #[error("Store read failed: {reason}")]
    StoreReadFailed { reason: String },

    /// Non-fatal; the merge and primary write still proceed.
    #[error("Vintage write failed: {reason}")]
    VintageWriteFailed { reason: String },

    /// A full fetch came back empty for a series that already holds data.
    /// Terminal; stored values are kept.
    #[error("No data returned for a series holding {stored_points} point(s)")]
    EmptyFetch { stored_points: usize },

    /// The worker running the task panicked or was aborted.
    #[error("Update task aborted: {reason}")]
    Aborted { reason: String },
}

impl TaskError {
    /// Whether the task still produced an updated value set.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, TaskError::VintageWriteFailed { .. })
    }

    /// Stable short label for reports and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            TaskError::FetchFailed { .. } => "fetch_failed",
            TaskError::StoreWriteFailed { .. } => "store_write_failed",
            TaskError::StoreReadFailed { .. } => "store_read_failed",
            TaskError::VintageWriteFailed { .. } => "vintage_write_failed",
            TaskError::EmptyFetch { .. } => "empty_fetch",
            TaskError::Aborted { .. } => "aborted",
        }
    }
}

impl From<FetchError> for TaskError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Failed { attempts, reason } => TaskError::FetchFailed { attempts, reason },
            // A range rejection that reaches here means the full-fetch fallback was not possible.
            FetchError::RangeUnsupported { query } => TaskError::FetchFailed {
                attempts: 0,
                reason: format!("range unsupported for {}", query),
            },
        }
    }
}
