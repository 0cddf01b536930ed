//! Diff & merge engine
//!
//! Compares the stored value set of a series against a freshly fetched one,
//! classifies every period, and produces the value set to persist.
//!
//! Classification over `old ∪ new`:
//! 1. present only in new            → added
//! 2. present only in old            → removed
//! 3. present in both, values differ → changed (null vs. non-null counts)
//! 4. present in both, values equal  → unchanged
//!
//! Merge policy:
//! - full fetch:    merged = new
//! - partial fetch: merged = old overlaid with new; periods outside the
//!   fetched window are preserved and never reported as removed
//!
//! Equality is exact decimal value equality. There is no tolerance, so a
//! last-digit revision is still a revision. Everything here is pure.

use rust_decimal::Decimal;
use tracing::trace;
use types::period::Period;
use types::report::{ChangeReport, ValueChange};
use types::series::FetchMode;
use types::values::{Value, ValueSet};

/// Merged value set plus the report describing how it differs from the old one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub merged: ValueSet,
    pub report: ChangeReport,
    pub mode: FetchMode,
}

/// Classifies every period of `old ∪ new`.
///
/// Output lists are chronologically sorted.
pub fn diff(old: &ValueSet, new: &ValueSet) -> ChangeReport {
    let mut report = ChangeReport::default();

    // Periods that existed before
    for (period, old_value) in old.iter() {
        match new.get(period) {
            None => report.removed.push(*period),
            Some(new_value) => match classify_change(*period, *old_value, *new_value) {
                Some(change) => report.changed.push(change),
                None => report.unchanged_count += 1,
            },
        }
    }

    // Periods that are new
    for period in new.periods() {
        if !old.contains(period) {
            report.added.push(*period);
        }
    }

    report
}

/// Diff `old` against `new` and build the value set to persist.
pub fn diff_and_merge(old: &ValueSet, new: &ValueSet, mode: FetchMode) -> MergeOutcome {
    let (merged, report) = match mode {
        FetchMode::Full => (new.clone(), diff(old, new)),
        FetchMode::Since(_) => {
            let mut merged = old.clone();
            merged.overlay(new);
            // old ∪ merged == old ∪ new, and merged ⊇ old, so nothing is "removed"
            let report = diff(old, &merged);
            (merged, report)
        }
    };

    trace!(
        mode = %mode,
        added = report.added.len(),
        removed = report.removed.len(),
        changed = report.changed.len(),
        unchanged = report.unchanged_count,
        "diff computed"
    );

    MergeOutcome {
        merged,
        report,
        mode,
    }
}

/// Builds a change entry when two values for the same period differ.
fn classify_change(period: Period, old: Value, new: Value) -> Option<ValueChange> {
    if old == new {
        return None;
    }

    let (delta, pct) = match (old, new) {
        (Some(o), Some(n)) => {
            let delta = n.checked_sub(o);
            (delta, delta.and_then(|d| percentage(o, d)))
        }
        _ => (None, None),
    };

    Some(ValueChange {
        period,
        old,
        new,
        delta,
        pct,
    })
}

/// `delta / old * 100`, undefined for a zero base.
fn percentage(old: Decimal, delta: Decimal) -> Option<Decimal> {
    if old.is_zero() {
        return None;
    }
    delta
        .checked_div(old)
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn p(s: &str) -> Period {
        s.parse().unwrap()
    }

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn set(points: &[(&str, Option<&str>)]) -> ValueSet {
        points
            .iter()
            .map(|(period, value)| (p(period), value.map(d)))
            .collect()
    }

    #[test]
    fn test_pure_addition() {
        let old = set(&[("2025-01", Some("0.54"))]);
        let new = set(&[("2025-01", Some("0.54")), ("2025-02", Some("0.30"))]);

        let report = diff(&old, &new);
        assert_eq!(report.added, vec![p("2025-02")]);
        assert!(report.removed.is_empty());
        assert!(report.changed.is_empty());
        assert_eq!(report.unchanged_count, 1);
        assert!(!report.warrants_vintage());
    }

    #[test]
    fn test_revision_with_percentage() {
        let old = set(&[("2025-01", Some("0.54"))]);
        let new = set(&[("2025-01", Some("0.56"))]);

        let report = diff(&old, &new);
        assert_eq!(report.changed.len(), 1);
        let change = &report.changed[0];
        assert_eq!(change.period, p("2025-01"));
        assert_eq!(change.old, Some(d("0.54")));
        assert_eq!(change.new, Some(d("0.56")));
        assert_eq!(change.delta, Some(d("0.02")));
        assert_eq!(change.pct.unwrap().round_dp(2), d("3.70"));
        assert!(report.warrants_vintage());
    }

    #[test]
    fn test_last_digit_revision_detected() {
        let old = set(&[("2025-01", Some("101.234567"))]);
        let new = set(&[("2025-01", Some("101.234568"))]);
        assert_eq!(diff(&old, &new).changed.len(), 1);
    }

    #[test]
    fn test_trailing_zero_is_not_a_revision() {
        let old = set(&[("2025-01", Some("1.50"))]);
        let new = set(&[("2025-01", Some("1.5"))]);
        let report = diff(&old, &new);
        assert!(report.is_empty());
        assert_eq!(report.unchanged_count, 1);
    }

    #[test]
    fn test_null_transitions_are_changes() {
        let old = set(&[("2025-01", None), ("2025-02", Some("2"))]);
        let new = set(&[("2025-01", Some("1")), ("2025-02", None)]);

        let report = diff(&old, &new);
        assert_eq!(report.changed.len(), 2);
        for change in &report.changed {
            assert_eq!(change.delta, None);
            assert_eq!(change.pct, None);
        }
    }

    #[test]
    fn test_zero_base_has_no_percentage() {
        let old = set(&[("2025-01", Some("0"))]);
        let new = set(&[("2025-01", Some("0.3"))]);
        let change = &diff(&old, &new).changed[0];
        assert_eq!(change.delta, Some(d("0.3")));
        assert_eq!(change.pct, None);
    }

    #[test]
    fn test_removal() {
        let old = set(&[("2024-12", Some("1")), ("2025-01", Some("2"))]);
        let new = set(&[("2025-01", Some("2"))]);
        let report = diff(&old, &new);
        assert_eq!(report.removed, vec![p("2024-12")]);
        assert!(report.warrants_vintage());
    }

    #[test]
    fn test_full_merge_replaces() {
        let old = set(&[("2024-12", Some("1")), ("2025-01", Some("2"))]);
        let new = set(&[("2025-01", Some("2.1")), ("2025-02", Some("3"))]);

        let outcome = diff_and_merge(&old, &new, FetchMode::Full);
        assert_eq!(outcome.merged, new);
        assert_eq!(outcome.report.removed, vec![p("2024-12")]);
        assert_eq!(outcome.report.added, vec![p("2025-02")]);
        assert_eq!(outcome.report.changed.len(), 1);
    }

    #[test]
    fn test_partial_merge_preserves_history() {
        let old = set(&[
            ("2024-11", Some("1")),
            ("2024-12", Some("2")),
            ("2025-01", Some("3")),
        ]);
        // Fetched since 2025-01: revises the last known period and appends one
        let new = set(&[("2025-01", Some("3.2")), ("2025-02", Some("4"))]);

        let outcome = diff_and_merge(&old, &new, FetchMode::Since(p("2025-01")));
        assert_eq!(outcome.merged.len(), 4);
        assert_eq!(outcome.merged.get(&p("2024-11")), Some(&Some(d("1"))));
        assert_eq!(outcome.merged.get(&p("2025-01")), Some(&Some(d("3.2"))));
        assert_eq!(outcome.merged.get(&p("2025-02")), Some(&Some(d("4"))));

        assert!(outcome.report.removed.is_empty());
        assert_eq!(outcome.report.added, vec![p("2025-02")]);
        assert_eq!(outcome.report.changed.len(), 1);
        assert_eq!(outcome.report.unchanged_count, 2);
    }

    #[test]
    fn test_partial_merge_with_empty_fetch() {
        let old = set(&[("2025-01", Some("3"))]);
        let outcome = diff_and_merge(&old, &ValueSet::new(), FetchMode::Since(p("2025-01")));
        assert_eq!(outcome.merged, old);
        assert!(outcome.report.is_empty());
    }

    #[test]
    fn test_first_ingestion_is_all_additions() {
        let new = set(&[("2025-01", Some("1")), ("2025-02", Some("2"))]);
        let outcome = diff_and_merge(&ValueSet::new(), &new, FetchMode::Full);
        assert_eq!(outcome.report.added.len(), 2);
        assert!(!outcome.report.warrants_vintage());
    }
}
