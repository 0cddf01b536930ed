//! Structured change report produced by comparing two value sets

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::period::Period;
use crate::values::Value;

/// A revision of a period present in both the old and the new value set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueChange {
    pub period: Period,
    /// Previously published value.
    pub old: Value,
    /// Newly published value.
    pub new: Value,
    /// `new - old`; undefined when either side is null.
    pub delta: Option<Decimal>,
    /// `(new - old) / old * 100` at full precision; undefined when old is null or zero.
    pub pct: Option<Decimal>,
}

/// Result of a diff between two versions of one series.
///
/// Every period in `old ∪ new` lands in exactly one of `added`, `removed`,
/// `changed` or the unchanged count.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeReport {
    /// Present in new, absent in old.
    pub added: Vec<Period>,
    /// Present in old, absent in new.
    pub removed: Vec<Period>,
    /// Present in both with a different value.
    pub changed: Vec<ValueChange>,
    pub unchanged_count: usize,
}

impl ChangeReport {
    /// No additions, removals or revisions.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }

    /// A vintage is due exactly when something previously published was lost or revised.
    pub fn warrants_vintage(&self) -> bool {
        !self.removed.is_empty() || !self.changed.is_empty()
    }

    pub fn total_changes(&self) -> usize {
        self.added.len() + self.removed.len() + self.changed.len()
    }

    /// Number of distinct periods the report classifies.
    pub fn classified_count(&self) -> usize {
        self.total_changes() + self.unchanged_count
    }

    /// Short human summary, e.g. `+2 new, ~1 revised`.
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return format!("no changes ({} unchanged)", self.unchanged_count);
        }
        let mut parts = Vec::new();
        if !self.added.is_empty() {
            parts.push(format!("+{} new", self.added.len()));
        }
        if !self.removed.is_empty() {
            parts.push(format!("-{} removed", self.removed.len()));
        }
        if !self.changed.is_empty() {
            parts.push(format!("~{} revised", self.changed.len()));
        }
        parts.join(", ")
    }
}
