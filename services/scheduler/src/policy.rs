//! Frequency policy engine
//!
//! Answers "is this series due today" from its dataset calendar and the
//! outcome of its last run:
//! - no recorded outcome (first run)       → due
//! - today in the primary window           → due
//! - today in the retry window, last failed → due
//! - otherwise                             → not due
//!
//! Decisions depend only on the inputs, so repeated calls for a fixed
//! catalog and date always agree.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use tracing::trace;
use types::ids::DatasetId;
use types::series::{LastOutcome, Scope, SeriesDescriptor};

use crate::schedule::{DatasetSchedule, Priority, ScheduleTable};

/// Ordering key for dispatch: tier first, then national before regional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DispatchRank {
    pub priority: Priority,
    pub scope: Scope,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DueDecision {
    pub due: bool,
    pub priority: Priority,
    pub scope: Scope,
    /// Today falls in the dataset's retry window (whether or not that made it due).
    pub is_retry_window: bool,
}

impl DueDecision {
    pub fn rank(&self) -> DispatchRank {
        DispatchRank {
            priority: self.priority,
            scope: self.scope,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FrequencyPolicy {
    table: ScheduleTable,
}

impl FrequencyPolicy {
    pub fn new(table: ScheduleTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &ScheduleTable {
        &self.table
    }

    pub fn schedule_for(&self, descriptor: &SeriesDescriptor) -> DatasetSchedule {
        self.table.resolve(&descriptor.dataset, descriptor.frequency)
    }

    /// Whether every series of the dataset must be fetched in full.
    pub fn is_revision_sensitive(&self, dataset: &DatasetId) -> bool {
        self.table
            .get(dataset)
            .map(|s| s.revision_sensitive)
            .unwrap_or(false)
    }

    pub fn is_due(
        &self,
        descriptor: &SeriesDescriptor,
        last_outcome: Option<LastOutcome>,
        today: NaiveDate,
    ) -> DueDecision {
        let schedule = self.schedule_for(descriptor);
        let (in_primary, in_retry) = windows_for(&schedule, today);

        let due = match last_outcome {
            None => true,
            Some(outcome) => in_primary || (in_retry && outcome.is_retry_eligible()),
        };

        trace!(
            series = %descriptor.id,
            dataset = %descriptor.dataset,
            %today,
            in_primary,
            in_retry,
            due,
            "due check"
        );

        DueDecision {
            due,
            priority: schedule.priority,
            scope: descriptor.scope,
            is_retry_window: in_retry,
        }
    }
}

/// `(in primary window, in retry window)` for a date.
fn windows_for(schedule: &DatasetSchedule, today: NaiveDate) -> (bool, bool) {
    if !schedule.in_release_month(today.month()) {
        return (false, false);
    }
    let day = today.day();
    let in_primary = schedule.primary.contains(day);
    let in_retry = !in_primary && schedule.retry.map(|w| w.contains(day)).unwrap_or(false);
    (in_primary, in_retry)
}
