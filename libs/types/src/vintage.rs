//! Immutable archived versions of a series

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{SeriesId, VintageId};
use crate::report::ChangeReport;
use crate::values::ValueSet;

/// Snapshot of a superseded value set together with the report that superseded it.
///
/// Vintages are append-only; a series accumulates them in `recorded_at` order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vintage {
    pub id: VintageId,
    pub series_id: SeriesId,
    pub recorded_at: DateTime<Utc>,
    /// The full value set as it was before the triggering update.
    pub superseded: ValueSet,
    pub report: ChangeReport,
}

impl Vintage {
    pub fn new(
        series_id: SeriesId,
        recorded_at: DateTime<Utc>,
        superseded: ValueSet,
        report: ChangeReport,
    ) -> Self {
        Self {
            id: VintageId::new(),
            series_id,
            recorded_at,
            superseded,
            report,
        }
    }

    /// Number of revised points that triggered this vintage.
    pub fn revised_points(&self) -> usize {
        self.report.changed.len()
    }
}
