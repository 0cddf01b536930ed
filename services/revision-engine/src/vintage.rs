//! Vintage recorder
//!
//! Archives the superseded value set of a series whenever a diff shows that
//! previously published information was lost: at least one removed or
//! changed period. Pure additions never produce a vintage.
//!
//! A failed append is returned as data. The caller still writes the merged
//! value set; a missing vintage is a data-quality warning only.

use std::sync::Arc;
use tracing::{debug, warn};
use types::clock::Clock;
use types::errors::TaskError;
use types::ids::SeriesId;
use types::report::ChangeReport;
use types::values::ValueSet;
use types::vintage::Vintage;

use series_store::VersionedStore;

/// What the recorder did for one update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VintageDecision {
    /// The report contains only additions or nothing at all.
    NotNeeded,
    /// The vintage was appended to the series history.
    Recorded(Vintage),
    /// The vintage was built but the append failed.
    WriteFailed { vintage: Vintage, error: TaskError },
}

impl VintageDecision {
    pub fn vintage(&self) -> Option<&Vintage> {
        match self {
            VintageDecision::NotNeeded => None,
            VintageDecision::Recorded(v) => Some(v),
            VintageDecision::WriteFailed { vintage, .. } => Some(vintage),
        }
    }

    pub fn is_recorded(&self) -> bool {
        matches!(self, VintageDecision::Recorded(_))
    }

    /// The non-fatal warning to attach to the task outcome, if any.
    pub fn warning(&self) -> Option<&TaskError> {
        match self {
            VintageDecision::WriteFailed { error, .. } => Some(error),
            _ => None,
        }
    }
}

pub struct VintageRecorder<S> {
    store: S,
    clock: Arc<dyn Clock>,
}

impl<S: VersionedStore> VintageRecorder<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Build the vintage a report calls for without persisting it.
    pub fn prepare(&self, series_id: &SeriesId, old: &ValueSet, report: &ChangeReport) -> Option<Vintage> {
        if !report.warrants_vintage() {
            return None;
        }
        Some(Vintage::new(
            series_id.clone(),
            self.clock.now(),
            old.clone(),
            report.clone(),
        ))
    }

    /// Archive `old` if `report` contains a removal or a revision.
    pub async fn record_if_needed(
        &self,
        series_id: &SeriesId,
        old: &ValueSet,
        report: &ChangeReport,
    ) -> VintageDecision {
        let vintage = match self.prepare(series_id, old, report) {
            Some(v) => v,
            None => return VintageDecision::NotNeeded,
        };

        match self.store.append_vintage(series_id, &vintage).await {
            Ok(()) => {
                debug!(
                    series = %series_id,
                    vintage = %vintage.id,
                    changed = report.changed.len(),
                    removed = report.removed.len(),
                    "vintage recorded"
                );
                VintageDecision::Recorded(vintage)
            }
            Err(e) => {
                warn!(series = %series_id, error = %e, "vintage append failed");
                VintageDecision::WriteFailed {
                    vintage,
                    error: TaskError::VintageWriteFailed {
                        reason: e.to_string(),
                    },
                }
            }
        }
    }
}
