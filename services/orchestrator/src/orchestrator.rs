//! Update orchestrator
//!
//! One run moves through `Selecting → Dispatching → Awaiting → Aggregating`:
//!
//! 1. Selecting: list the catalog, apply the dataset filter, drop duplicate
//!    series, ask the frequency policy which series are due. A catalog
//!    failure ends the run with `SelectionFailed` and nothing dispatched.
//! 2. Dispatching: group tasks by priority tier, then by dataset, then into
//!    a national and a regional phase.
//! 3. Awaiting: tiers run in priority order. Datasets inside a tier run
//!    concurrently; inside a dataset the national phase completes before the
//!    regional phase starts. A global semaphore caps running tasks.
//! 4. Aggregating: every task result lands in the `RunReport`.
//!
//! Cancellation (operator signal or run timeout) stops new dispatches.
//! Tasks already running finish their current stage; undispatched tasks are
//! reported as `Cancelled`.

use chrono::NaiveDate;
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, info_span, warn, Instrument};
use types::clock::Clock;
use types::errors::TaskError;
use types::ids::{DatasetId, RunId};
use types::series::{Scope, SeriesDescriptor};

use scheduler::{CatalogError, FrequencyPolicy, Priority, SeriesCatalog};
use series_store::VersionedStore;

use crate::cancel::CancelToken;
use crate::config::RunConfig;
use crate::pipeline::{Fetcher, Pipeline, TaskOutcome, TaskResult, UpdateTask};
use crate::report::{RunReport, RunStatus};

/// Concurrent metadata reads during selection.
const SELECTION_READ_AHEAD: usize = 32;

/// Tasks of one dataset, split by scope.
#[derive(Debug, Default, Clone)]
pub struct DatasetPhases {
    pub national: Vec<UpdateTask>,
    pub regional: Vec<UpdateTask>,
}

impl DatasetPhases {
    pub fn len(&self) -> usize {
        self.national.len() + self.regional.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Tier → dataset → phases. Iteration order is dispatch order.
pub type DispatchPlan = BTreeMap<Priority, BTreeMap<DatasetId, DatasetPhases>>;

/// Group due tasks into the dispatch plan. Series order inside a phase is by id.
pub fn plan(tasks: Vec<UpdateTask>) -> DispatchPlan {
    let mut plan = DispatchPlan::new();
    for task in tasks {
        let phases = plan
            .entry(task.decision.priority)
            .or_default()
            .entry(task.descriptor.dataset.clone())
            .or_default();
        match task.descriptor.scope {
            Scope::National => phases.national.push(task),
            Scope::Regional => phases.regional.push(task),
        }
    }
    for datasets in plan.values_mut() {
        for phases in datasets.values_mut() {
            phases.national.sort_by(|a, b| a.descriptor.id.as_str().cmp(b.descriptor.id.as_str()));
            phases.regional.sort_by(|a, b| a.descriptor.id.as_str().cmp(b.descriptor.id.as_str()));
        }
    }
    plan
}

pub struct Orchestrator<F, S> {
    catalog: Arc<dyn SeriesCatalog>,
    policy: FrequencyPolicy,
    pipeline: Arc<Pipeline<F, S>>,
    clock: Arc<dyn Clock>,
    config: RunConfig,
}

impl<F, S> Orchestrator<F, S>
where
    F: Fetcher + 'static,
    S: VersionedStore + Clone + 'static,
{
    pub fn new(
        catalog: Arc<dyn SeriesCatalog>,
        policy: FrequencyPolicy,
        pipeline: Pipeline<F, S>,
        clock: Arc<dyn Clock>,
        config: RunConfig,
    ) -> Self {
        Self {
            catalog,
            policy,
            pipeline: Arc::new(pipeline),
            clock,
            config,
        }
    }

    /// Execute one run for `as_of`. Never fails: every problem is in the report.
    pub async fn run(&self, as_of: NaiveDate, cancel: CancelToken) -> RunReport {
        let run_id = RunId::new();
        let mut report = RunReport::new(run_id, as_of, self.clock.now(), self.pipeline.is_dry_run());
        info!(run = %run_id, %as_of, dry_run = report.dry_run, concurrency = self.config.concurrency, "run started");

        let tasks = match self.select(as_of).await {
            Ok(tasks) => tasks,
            Err(e) => {
                error!(run = %run_id, error = %e, "selection failed, nothing dispatched");
                report.finish(RunStatus::SelectionFailed(e.to_string()), self.clock.now());
                return report;
            }
        };

        let (token, watcher) = cancel.with_timeout(self.config.timeout());
        let workers = Arc::new(Semaphore::new(self.config.concurrency.max(1)));

        for (priority, datasets) in plan(tasks) {
            let tier_size: usize = datasets.values().map(DatasetPhases::len).sum();
            info!(run = %run_id, %priority, datasets = datasets.len(), tasks = tier_size, "dispatching tier");

            let runs = datasets
                .into_iter()
                .map(|(dataset, phases)| self.run_dataset(dataset, phases, &workers, &token));
            for results in join_all(runs).await {
                for result in &results {
                    report.record(result);
                }
            }
        }

        watcher.abort();
        let status = if token.is_cancelled() {
            RunStatus::Cancelled
        } else {
            RunStatus::Completed
        };
        report.finish(status, self.clock.now());
        info!(run = %run_id, status = ?report.status, summary = %report.summary(), "run complete");
        report
    }

    /// Due tasks for `as_of`, one per series.
    pub async fn select(&self, as_of: NaiveDate) -> Result<Vec<UpdateTask>, CatalogError> {
        let descriptors = self.catalog.list_due(as_of).await?;
        let candidates = descriptors.len();

        let mut seen = HashSet::new();
        let eligible: Vec<SeriesDescriptor> = descriptors
            .into_iter()
            .filter(|d| self.config.datasets.is_empty() || self.config.datasets.contains(&d.dataset))
            .filter(|d| {
                let first = seen.insert(d.id.clone());
                if !first {
                    warn!(series = %d.id, "duplicate catalog entry ignored");
                }
                first
            })
            .collect();

        let store = self.pipeline.store();
        let decided: Vec<UpdateTask> = stream::iter(eligible)
            .map(|descriptor| async move {
                let last_outcome = match store.metadata(&descriptor.id).await {
                    Ok(metadata) => metadata.and_then(|m| m.last_outcome),
                    Err(e) => {
                        warn!(series = %descriptor.id, error = %e, "metadata unreadable, treating as never run");
                        None
                    }
                };
                let decision = self.policy.is_due(&descriptor, last_outcome, as_of);
                let force_full =
                    self.config.force_full || self.policy.is_revision_sensitive(&descriptor.dataset);
                UpdateTask {
                    descriptor,
                    decision,
                    force_full,
                }
            })
            .buffered(SELECTION_READ_AHEAD)
            .filter(|task| futures::future::ready(task.decision.due))
            .collect()
            .await;

        info!(candidates, due = decided.len(), "selection complete");
        Ok(decided)
    }

    async fn run_dataset(
        &self,
        dataset: DatasetId,
        phases: DatasetPhases,
        workers: &Arc<Semaphore>,
        cancel: &CancelToken,
    ) -> Vec<TaskResult> {
        debug!(%dataset, national = phases.national.len(), regional = phases.regional.len(), "dataset started");
        let mut results = self.run_phase(phases.national, workers, cancel).await;
        results.extend(self.run_phase(phases.regional, workers, cancel).await);
        results
    }

    /// Dispatch every task of a phase and wait for all of them.
    async fn run_phase(
        &self,
        tasks: Vec<UpdateTask>,
        workers: &Arc<Semaphore>,
        cancel: &CancelToken,
    ) -> Vec<TaskResult> {
        let mut running = Vec::with_capacity(tasks.len());
        let mut results = Vec::with_capacity(tasks.len());

        for task in tasks {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = Arc::clone(workers).acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                results.push(TaskResult::new(&task, TaskOutcome::Cancelled));
                continue;
            };

            let pipeline = Arc::clone(&self.pipeline);
            let token = cancel.clone();
            let span = info_span!(
                "update",
                series = %task.descriptor.id,
                dataset = %task.descriptor.dataset,
                scope = %task.descriptor.scope
            );
            let job = task.clone();
            let handle = tokio::spawn(
                async move {
                    let _permit = permit;
                    pipeline.run(&job, &token).await
                }
                .instrument(span),
            );
            running.push((task, handle));
        }

        for (task, handle) in running {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    error!(series = %task.descriptor.id, error = %e, "update task aborted");
                    let error = TaskError::Aborted {
                        reason: e.to_string(),
                    };
                    TaskResult::new(&task, TaskOutcome::Failed { error })
                }
            };
            results.push(result);
        }
        results
    }
}
