//! Value points and chronologically ordered value sets
//!
//! Values are opaque exact decimals (`rust_decimal::Decimal`); a missing
//! observation published by the source is a null point, not an absent one.
//! No rounding or unit conversion happens anywhere in this crate.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::btree_map;
use std::collections::BTreeMap;

use crate::period::Period;

/// A nullable numeric observation.
pub type Value = Option<Decimal>;

/// One (period, value) pair of a series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValuePoint {
    pub period: Period,
    pub value: Value,
}

/// Period → value mapping for one series at one point in time.
///
/// Backed by a `BTreeMap` so iteration is chronological and serialization
/// is deterministic. Periods are unique by construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValueSet {
    points: BTreeMap<Period, Value>,
}

impl ValueSet {
    pub fn new() -> Self {
        Self {
            points: BTreeMap::new(),
        }
    }

    /// Insert or overwrite the value for a period, returning the previous value.
    pub fn insert(&mut self, period: Period, value: Value) -> Option<Value> {
        self.points.insert(period, value)
    }

    /// Value stored for a period. `None` means the period is absent;
    /// `Some(None)` means the period is present with a null value.
    pub fn get(&self, period: &Period) -> Option<&Value> {
        self.points.get(period)
    }

    pub fn contains(&self, period: &Period) -> bool {
        self.points.contains_key(period)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Most recent period present, if any.
    pub fn last_period(&self) -> Option<Period> {
        self.points.keys().next_back().copied()
    }

    pub fn first_period(&self) -> Option<Period> {
        self.points.keys().next().copied()
    }

    /// Chronological iteration over (period, value).
    pub fn iter(&self) -> btree_map::Iter<'_, Period, Value> {
        self.points.iter()
    }

    pub fn periods(&self) -> impl Iterator<Item = &Period> {
        self.points.keys()
    }

    pub fn points(&self) -> impl Iterator<Item = ValuePoint> + '_ {
        self.points.iter().map(|(period, value)| ValuePoint {
            period: *period,
            value: *value,
        })
    }

    /// Overwrite every period present in `other`; periods only in `self` are kept.
    pub fn overlay(&mut self, other: &ValueSet) {
        for (period, value) in other.iter() {
            self.points.insert(*period, *value);
        }
    }

    /// SHA-256 over the canonical JSON form, hex encoded.
    ///
    /// Uses the normalized decimal text so `1.50` and `1.5` hash equally,
    /// matching the value equality used by the diff.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        for (period, value) in &self.points {
            hasher.update(period.to_string().as_bytes());
            hasher.update(b"=");
            match value {
                Some(v) => hasher.update(v.normalize().to_string().as_bytes()),
                None => hasher.update(b"null"),
            }
            hasher.update(b";");
        }
        format!("{:x}", hasher.finalize())
    }
}

impl FromIterator<(Period, Value)> for ValueSet {
    fn from_iter<I: IntoIterator<Item = (Period, Value)>>(iter: I) -> Self {
        Self {
            points: iter.into_iter().collect(),
        }
    }
}

impl FromIterator<ValuePoint> for ValueSet {
    fn from_iter<I: IntoIterator<Item = ValuePoint>>(iter: I) -> Self {
        iter.into_iter().map(|p| (p.period, p.value)).collect()
    }
}

impl IntoIterator for ValueSet {
    type Item = (Period, Value);
    type IntoIter = btree_map::IntoIter<Period, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.into_iter()
    }
}

impl<'a> IntoIterator for &'a ValueSet {
    type Item = (&'a Period, &'a Value);
    type IntoIter = btree_map::Iter<'a, Period, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}
