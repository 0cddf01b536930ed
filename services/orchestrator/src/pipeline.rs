//! Per-series update pipeline
//!
//! One `UpdateTask` runs Fetch → Diff/Merge → Vintage → Store in isolation.
//! Every failure becomes a `TaskOutcome` value; nothing here panics or
//! propagates an error to the orchestrator.
//!
//! Write rules:
//! - fetch failure: metadata-only write of `Failure`, values untouched
//! - empty full fetch over stored data: treated as a fetch failure
//! - no change: metadata-only write of `NoChange`
//! - cancellation is checked before the fetch and before the first write;
//!   once writing starts the task runs to completion
//! - dry run: no writes at all

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};
use types::clock::Clock;
use types::errors::{FetchError, TaskError};
use types::ids::{DatasetId, SeriesId};
use types::period::Period;
use types::series::{FetchMode, LastOutcome, Scope, SeriesDescriptor, SeriesMetadata};
use types::values::ValueSet;

use fetch_client::{FetchClient, Upstream};
use revision_engine::{diff_and_merge, MergeOutcome, VintageRecorder};
use scheduler::DueDecision;
use series_store::{StoredSeries, VersionedStore};

use crate::cancel::CancelToken;

// ── Fetch port ──────────────────────────────────────────────────────

/// Source of fetched value sets, as seen by the pipeline.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch_full(&self, descriptor: &SeriesDescriptor) -> Result<ValueSet, FetchError>;

    async fn fetch_since(
        &self,
        descriptor: &SeriesDescriptor,
        since: Period,
    ) -> Result<ValueSet, FetchError>;
}

#[async_trait]
impl<U: Upstream> Fetcher for FetchClient<U> {
    async fn fetch_full(&self, descriptor: &SeriesDescriptor) -> Result<ValueSet, FetchError> {
        FetchClient::fetch_full(self, descriptor).await
    }

    async fn fetch_since(
        &self,
        descriptor: &SeriesDescriptor,
        since: Period,
    ) -> Result<ValueSet, FetchError> {
        FetchClient::fetch_since(self, descriptor, since).await
    }
}

#[async_trait]
impl<F: Fetcher + ?Sized> Fetcher for Arc<F> {
    async fn fetch_full(&self, descriptor: &SeriesDescriptor) -> Result<ValueSet, FetchError> {
        (**self).fetch_full(descriptor).await
    }

    async fn fetch_since(
        &self,
        descriptor: &SeriesDescriptor,
        since: Period,
    ) -> Result<ValueSet, FetchError> {
        (**self).fetch_since(descriptor, since).await
    }
}

// ── Tasks and outcomes ──────────────────────────────────────────────

/// One unit of work: a due series and how it must be fetched.
#[derive(Debug, Clone)]
pub struct UpdateTask {
    pub descriptor: SeriesDescriptor,
    pub decision: DueDecision,
    /// Skip ranged fetching (revision-sensitive dataset or operator override).
    pub force_full: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Updated {
        added: usize,
        changed: usize,
        removed: usize,
    },
    NoChange,
    /// Values were written but the vintage append failed.
    UpdatedWithWarning {
        added: usize,
        changed: usize,
        removed: usize,
        warning: TaskError,
    },
    Failed {
        error: TaskError,
    },
    /// Never started, or stopped before any write.
    Cancelled,
}

impl TaskOutcome {
    /// What the store records for this outcome; `None` means nothing is recorded.
    pub fn last_outcome(&self) -> Option<LastOutcome> {
        match self {
            TaskOutcome::Updated { .. } => Some(LastOutcome::Success),
            TaskOutcome::NoChange => Some(LastOutcome::NoChange),
            TaskOutcome::UpdatedWithWarning { .. } => Some(LastOutcome::PartialFailure),
            TaskOutcome::Failed { .. } => Some(LastOutcome::Failure),
            TaskOutcome::Cancelled => None,
        }
    }

    pub fn is_updated(&self) -> bool {
        matches!(
            self,
            TaskOutcome::Updated { .. } | TaskOutcome::UpdatedWithWarning { .. }
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            TaskOutcome::Updated { .. } => "updated",
            TaskOutcome::NoChange => "no_change",
            TaskOutcome::UpdatedWithWarning { .. } => "updated_with_warning",
            TaskOutcome::Failed { .. } => "failed",
            TaskOutcome::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResult {
    pub series_id: SeriesId,
    pub dataset: DatasetId,
    pub scope: Scope,
    pub outcome: TaskOutcome,
    /// Mode actually used, after any range fallback. `None` when nothing was fetched.
    pub mode: Option<FetchMode>,
    /// Previously published periods whose value changed.
    pub revised_points: usize,
    /// Whether this attempt's outcome reached the store.
    pub outcome_recorded: bool,
}

impl TaskResult {
    pub fn new(task: &UpdateTask, outcome: TaskOutcome) -> Self {
        Self {
            series_id: task.descriptor.id.clone(),
            dataset: task.descriptor.dataset.clone(),
            scope: task.descriptor.scope,
            outcome,
            mode: None,
            revised_points: 0,
            outcome_recorded: false,
        }
    }

    fn with_mode(mut self, mode: FetchMode) -> Self {
        self.mode = Some(mode);
        self
    }

    fn recorded(mut self, recorded: bool) -> Self {
        self.outcome_recorded = recorded;
        self
    }
}

// ── Pipeline ────────────────────────────────────────────────────────

pub struct Pipeline<F, S> {
    fetcher: F,
    store: S,
    recorder: VintageRecorder<S>,
    clock: Arc<dyn Clock>,
    dry_run: bool,
}

impl<F, S> Pipeline<F, S>
where
    F: Fetcher,
    S: VersionedStore + Clone,
{
    pub fn new(fetcher: F, store: S, clock: Arc<dyn Clock>, dry_run: bool) -> Self {
        let recorder = VintageRecorder::new(store.clone(), Arc::clone(&clock));
        Self {
            fetcher,
            store,
            recorder,
            clock,
            dry_run,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub async fn run(&self, task: &UpdateTask, cancel: &CancelToken) -> TaskResult {
        let descriptor = &task.descriptor;
        let id = &descriptor.id;

        if cancel.is_cancelled() {
            return TaskResult::new(task, TaskOutcome::Cancelled);
        }

        let stored = match self.store.get(id).await {
            Ok(stored) => stored.unwrap_or_default(),
            Err(e) => {
                warn!(series = %id, error = %e, "stored series unreadable, skipping");
                let error = TaskError::StoreReadFailed {
                    reason: e.to_string(),
                };
                return TaskResult::new(task, TaskOutcome::Failed { error });
            }
        };

        let requested = choose_mode(task, &stored);
        let (fetched, mode) = match self.fetch(descriptor, requested).await {
            Ok(ok) => ok,
            Err(e) => {
                let error = TaskError::from(e);
                warn!(series = %id, mode = %requested, error = %error, "fetch failed");
                let recorded = self.note_outcome(id, &stored.metadata, LastOutcome::Failure).await;
                return TaskResult::new(task, TaskOutcome::Failed { error })
                    .with_mode(requested)
                    .recorded(recorded);
            }
        };

        if mode == FetchMode::Full && fetched.is_empty() && !stored.values.is_empty() {
            let error = TaskError::EmptyFetch {
                stored_points: stored.values.len(),
            };
            warn!(series = %id, error = %error, "full fetch returned no data, keeping stored values");
            let recorded = self.note_outcome(id, &stored.metadata, LastOutcome::Failure).await;
            return TaskResult::new(task, TaskOutcome::Failed { error })
                .with_mode(mode)
                .recorded(recorded);
        }

        let MergeOutcome {
            merged,
            report,
            mode,
        } = diff_and_merge(&stored.values, &fetched, mode);

        if report.is_empty() {
            debug!(series = %id, %mode, unchanged = report.unchanged_count, "no change");
            if let Err(error) = self.write_outcome(id, &stored.metadata, LastOutcome::NoChange).await {
                return TaskResult::new(task, TaskOutcome::Failed { error }).with_mode(mode);
            }
            return TaskResult::new(task, TaskOutcome::NoChange)
                .with_mode(mode)
                .recorded(!self.dry_run);
        }

        let (added, changed, removed) = (report.added.len(), report.changed.len(), report.removed.len());
        let revised_points = changed;

        if cancel.is_cancelled() {
            debug!(series = %id, "cancelled before write");
            return TaskResult::new(task, TaskOutcome::Cancelled).with_mode(mode);
        }

        if self.dry_run {
            let vintage = self.recorder.prepare(id, &stored.values, &report);
            info!(
                series = %id,
                %mode,
                changes = %report.summary(),
                would_record_vintage = vintage.is_some(),
                "dry run: update not written"
            );
            let mut result = TaskResult::new(task, TaskOutcome::Updated { added, changed, removed }).with_mode(mode);
            result.revised_points = revised_points;
            return result;
        }

        let decision = self.recorder.record_if_needed(id, &stored.values, &report).await;
        let warning = decision.warning().cloned();

        let now = self.clock.now();
        let outcome_tag = if warning.is_some() {
            LastOutcome::PartialFailure
        } else {
            LastOutcome::Success
        };
        let mut metadata = stored.metadata.with_attempt(outcome_tag, now);
        metadata.last_period = merged.last_period();
        if decision.is_recorded() {
            metadata.vintage_count += 1;
        }

        if let Err(e) = self.store.put(id, &merged, &metadata).await {
            warn!(series = %id, error = %e, "store write failed");
            let error = TaskError::StoreWriteFailed {
                reason: e.to_string(),
            };
            let recorded = self.note_outcome(id, &stored.metadata, LastOutcome::Failure).await;
            return TaskResult::new(task, TaskOutcome::Failed { error })
                .with_mode(mode)
                .recorded(recorded);
        }

        info!(
            series = %id,
            dataset = %descriptor.dataset,
            %mode,
            changes = %report.summary(),
            vintage = decision.is_recorded(),
            last_period = ?metadata.last_period,
            "series updated"
        );

        let outcome = match warning {
            Some(warning) => TaskOutcome::UpdatedWithWarning {
                added,
                changed,
                removed,
                warning,
            },
            None => TaskOutcome::Updated {
                added,
                changed,
                removed,
            },
        };
        let mut result = TaskResult::new(task, outcome).with_mode(mode).recorded(true);
        result.revised_points = revised_points;
        result
    }

    /// Fetch in the requested mode, falling back to a full fetch when the
    /// source refuses a ranged query.
    async fn fetch(
        &self,
        descriptor: &SeriesDescriptor,
        mode: FetchMode,
    ) -> Result<(ValueSet, FetchMode), FetchError> {
        match mode {
            FetchMode::Full => Ok((self.fetcher.fetch_full(descriptor).await?, FetchMode::Full)),
            FetchMode::Since(since) => match self.fetcher.fetch_since(descriptor, since).await {
                Ok(values) => Ok((values, mode)),
                Err(e) if e.is_range_unsupported() => {
                    debug!(series = %descriptor.id, %since, "range unsupported, fetching full history");
                    Ok((self.fetcher.fetch_full(descriptor).await?, FetchMode::Full))
                }
                Err(e) => Err(e),
            },
        }
    }

    /// Metadata-only write. Skipped in dry runs.
    async fn write_outcome(
        &self,
        id: &SeriesId,
        previous: &SeriesMetadata,
        outcome: LastOutcome,
    ) -> Result<(), TaskError> {
        if self.dry_run {
            return Ok(());
        }
        let metadata = previous.with_attempt(outcome, self.clock.now());
        self.store.record_outcome(id, &metadata).await.map_err(|e| {
            warn!(series = %id, outcome = ?outcome, error = %e, "outcome write failed");
            TaskError::StoreWriteFailed {
                reason: e.to_string(),
            }
        })
    }

    /// Best effort: the task has already failed, so a failed write is only logged.
    /// Returns whether the outcome was stored.
    async fn note_outcome(&self, id: &SeriesId, previous: &SeriesMetadata, outcome: LastOutcome) -> bool {
        !self.dry_run && self.write_outcome(id, previous, outcome).await.is_ok()
    }
}

/// Ranged fetch needs a known last period, a rangeable query and no full-fetch override.
pub fn choose_mode(task: &UpdateTask, stored: &StoredSeries) -> FetchMode {
    let last = stored.metadata.last_period.or_else(|| stored.values.last_period());
    match last {
        Some(since) if !task.force_full && task.descriptor.supports_range => FetchMode::Since(since),
        _ => FetchMode::Full,
    }
}
