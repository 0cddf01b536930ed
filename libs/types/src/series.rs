//! Series descriptors, scheduling tags and per-series stored metadata

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::{DatasetId, SeriesId};
use crate::period::{Period, PeriodKind};

/// Publication frequency class of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Monthly,
    Quarterly,
}

impl Frequency {
    /// Period granularity of observations published at this frequency.
    pub fn period_kind(&self) -> PeriodKind {
        match self {
            Frequency::Daily => PeriodKind::Day,
            Frequency::Monthly => PeriodKind::Month,
            Frequency::Quarterly => PeriodKind::Quarter,
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Frequency::Daily => "daily",
            Frequency::Monthly => "monthly",
            Frequency::Quarterly => "quarterly",
        };
        write!(f, "{}", s)
    }
}

/// Territorial scope. National sorts before regional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    National,
    Regional,
}

impl Scope {
    /// Derive scope from a source query: territorial level 1 (`/n1/`) is national.
    pub fn from_query(query: &SourceQuery) -> Self {
        if query.as_str().contains("/n1/") {
            Scope::National
        } else {
            Scope::Regional
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::National => write!(f, "national"),
            Scope::Regional => write!(f, "regional"),
        }
    }
}

/// Query template understood by the upstream source (a path or URL).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceQuery(String);

impl SourceQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self(query.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Catalog entry for one series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesDescriptor {
    pub id: SeriesId,
    pub dataset: DatasetId,
    pub frequency: Frequency,
    pub scope: Scope,
    pub query: SourceQuery,
    /// Whether the source is known to honor range-restricted queries for this series.
    #[serde(default = "default_supports_range")]
    pub supports_range: bool,
    #[serde(default)]
    pub label: Option<String>,
}

fn default_supports_range() -> bool {
    true
}

/// How much of a series to request from the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchMode {
    /// Entire history; the fetched set replaces the stored one.
    Full,
    /// Only periods at or after the given period; fetched points overlay the stored set.
    Since(Period),
}

impl FetchMode {
    pub fn is_full(&self) -> bool {
        matches!(self, FetchMode::Full)
    }
}

impl fmt::Display for FetchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchMode::Full => write!(f, "full"),
            FetchMode::Since(p) => write!(f, "since {}", p),
        }
    }
}

/// Outcome of the most recent run that touched a series, as persisted in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LastOutcome {
    Success,
    NoChange,
    PartialFailure,
    Failure,
}

impl LastOutcome {
    /// Failed or partially failed runs make a series eligible in its retry window.
    pub fn is_retry_eligible(&self) -> bool {
        matches!(self, LastOutcome::Failure | LastOutcome::PartialFailure)
    }
}

/// Per-series bookkeeping kept alongside the value set in the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesMetadata {
    pub last_period: Option<Period>,
    pub last_outcome: Option<LastOutcome>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub vintage_count: u64,
    /// SHA-256 of the stored value set, verified on load by file-backed stores.
    #[serde(default)]
    pub content_hash: Option<String>,
}

impl SeriesMetadata {
    /// Metadata after an attempt that did not change stored values.
    pub fn with_attempt(&self, outcome: LastOutcome, at: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.last_outcome = Some(outcome);
        next.last_attempt_at = Some(at);
        if !outcome.is_retry_eligible() {
            next.last_success_at = Some(at);
        }
        next
    }
}
