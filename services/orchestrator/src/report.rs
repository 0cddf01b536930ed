//! Run report and its sinks
//!
//! The report is the only artifact a run hands to the outside world:
//! per-dataset tallies, the series that carried revisions, and the
//! failures with their retry eligibility.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};
use types::ids::{DatasetId, RunId, SeriesId};
use types::series::Scope;

use crate::pipeline::{TaskOutcome, TaskResult};

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("IO error writing report to {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Cancelled,
    /// The catalog could not be read; no task was dispatched.
    SelectionFailed(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetTally {
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl DatasetTally {
    pub fn total(&self) -> usize {
        self.updated + self.unchanged + self.failed + self.cancelled
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisedSeries {
    pub series_id: SeriesId,
    pub dataset: DatasetId,
    pub revised_points: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedSeries {
    pub series_id: SeriesId,
    pub dataset: DatasetId,
    pub scope: Scope,
    pub kind: String,
    pub reason: String,
    /// Picked up again in the dataset's retry window.
    pub retry_eligible: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskWarning {
    pub series_id: SeriesId,
    pub dataset: DatasetId,
    pub kind: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub as_of: NaiveDate,
    pub dry_run: bool,
    pub status: RunStatus,
    pub datasets: BTreeMap<DatasetId, DatasetTally>,
    pub revised: Vec<RevisedSeries>,
    pub failures: Vec<FailedSeries>,
    pub warnings: Vec<TaskWarning>,
}

impl RunReport {
    pub fn new(run_id: RunId, as_of: NaiveDate, started_at: DateTime<Utc>, dry_run: bool) -> Self {
        Self {
            run_id,
            started_at,
            finished_at: started_at,
            as_of,
            dry_run,
            status: RunStatus::Completed,
            datasets: BTreeMap::new(),
            revised: Vec::new(),
            failures: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn record(&mut self, result: &TaskResult) {
        let tally = self.datasets.entry(result.dataset.clone()).or_default();
        match &result.outcome {
            TaskOutcome::Updated { .. } => tally.updated += 1,
            TaskOutcome::UpdatedWithWarning { warning, .. } => {
                tally.updated += 1;
                self.warnings.push(TaskWarning {
                    series_id: result.series_id.clone(),
                    dataset: result.dataset.clone(),
                    kind: warning.kind().to_string(),
                    reason: warning.to_string(),
                });
            }
            TaskOutcome::NoChange => tally.unchanged += 1,
            TaskOutcome::Failed { error } => {
                tally.failed += 1;
                self.failures.push(FailedSeries {
                    series_id: result.series_id.clone(),
                    dataset: result.dataset.clone(),
                    scope: result.scope,
                    kind: error.kind().to_string(),
                    reason: error.to_string(),
                    // Only a stored `Failure` brings the series back in the retry window
                    retry_eligible: result.outcome_recorded,
                });
            }
            TaskOutcome::Cancelled => tally.cancelled += 1,
        }

        if result.revised_points > 0 {
            self.revised.push(RevisedSeries {
                series_id: result.series_id.clone(),
                dataset: result.dataset.clone(),
                revised_points: result.revised_points,
            });
        }
    }

    pub fn finish(&mut self, status: RunStatus, at: DateTime<Utc>) {
        self.status = status;
        self.finished_at = at;
        self.revised.sort_by(|a, b| a.series_id.as_str().cmp(b.series_id.as_str()));
        self.failures.sort_by(|a, b| a.series_id.as_str().cmp(b.series_id.as_str()));
    }

    pub fn totals(&self) -> DatasetTally {
        self.datasets.values().fold(DatasetTally::default(), |acc, t| DatasetTally {
            updated: acc.updated + t.updated,
            unchanged: acc.unchanged + t.unchanged,
            failed: acc.failed + t.failed,
            cancelled: acc.cancelled + t.cancelled,
        })
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty() || matches!(self.status, RunStatus::SelectionFailed(_))
    }

    pub fn failures_for<'a>(&'a self, dataset: &'a DatasetId) -> impl Iterator<Item = &'a FailedSeries> + 'a {
        self.failures.iter().filter(move |f| &f.dataset == dataset)
    }

    pub fn summary(&self) -> String {
        let t = self.totals();
        format!(
            "{} updated, {} unchanged, {} failed, {} cancelled, {} revised",
            t.updated,
            t.unchanged,
            t.failed,
            t.cancelled,
            self.revised.len()
        )
    }
}

// ── Sinks ───────────────────────────────────────────────────────────

/// Destination for finished run reports.
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn publish(&self, report: &RunReport) -> Result<(), ReportError>;
}

/// Writes `update_results_<date>.json` plus one
/// `failed_update_<dataset>_<timestamp>.json` per dataset with failures.
pub struct JsonReportSink {
    dir: PathBuf,
}

impl JsonReportSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn results_path(&self, report: &RunReport) -> PathBuf {
        self.dir
            .join(format!("update_results_{}.json", report.as_of.format("%Y-%m-%d")))
    }

    pub fn failures_path(&self, report: &RunReport, dataset: &DatasetId) -> PathBuf {
        self.dir.join(format!(
            "failed_update_{}_{}.json",
            file_safe(dataset.as_str()),
            report.finished_at.format("%Y%m%d_%H%M%S")
        ))
    }
}

#[async_trait]
impl ReportSink for JsonReportSink {
    async fn publish(&self, report: &RunReport) -> Result<(), ReportError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| io_error(&self.dir, source))?;

        let path = self.results_path(report);
        write_json(&path, report).await?;
        info!(path = %path.display(), "run report written");

        for (dataset, tally) in &report.datasets {
            if tally.failed == 0 {
                continue;
            }
            let failures: Vec<&FailedSeries> = report.failures_for(dataset).collect();
            let path = self.failures_path(report, dataset);
            write_json(&path, &failures).await?;
            info!(path = %path.display(), %dataset, failed = failures.len(), "failure list written");
        }
        Ok(())
    }
}

/// Emits the report as structured log events.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReportSink;

#[async_trait]
impl ReportSink for LogReportSink {
    async fn publish(&self, report: &RunReport) -> Result<(), ReportError> {
        for (dataset, tally) in &report.datasets {
            info!(
                run = %report.run_id,
                %dataset,
                updated = tally.updated,
                unchanged = tally.unchanged,
                failed = tally.failed,
                cancelled = tally.cancelled,
                "dataset summary"
            );
        }
        for revised in &report.revised {
            info!(series = %revised.series_id, dataset = %revised.dataset, points = revised.revised_points, "revised");
        }
        for failure in &report.failures {
            warn!(
                series = %failure.series_id,
                dataset = %failure.dataset,
                kind = %failure.kind,
                retry_eligible = failure.retry_eligible,
                reason = %failure.reason,
                "series failed"
            );
        }
        for warning in &report.warnings {
            warn!(series = %warning.series_id, kind = %warning.kind, reason = %warning.reason, "series warning");
        }
        info!(run = %report.run_id, status = ?report.status, summary = %report.summary(), "run finished");
        Ok(())
    }
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), ReportError> {
    let body = serde_json::to_vec_pretty(value)?;
    tokio::fs::write(path, body)
        .await
        .map_err(|source| io_error(path, source))
}

fn io_error(path: &Path, source: std::io::Error) -> ReportError {
    ReportError::Io {
        path: path.display().to_string(),
        source,
    }
}

fn file_safe(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use types::errors::TaskError;
    use types::series::FetchMode;

    fn result(series: &str, dataset: &str, outcome: TaskOutcome, revised_points: usize) -> TaskResult {
        TaskResult {
            series_id: SeriesId::new(series),
            dataset: DatasetId::new(dataset),
            scope: Scope::National,
            outcome,
            mode: Some(FetchMode::Full),
            revised_points,
            outcome_recorded: true,
        }
    }

    fn sample() -> RunReport {
        let started = Utc.with_ymd_and_hms(2025, 3, 17, 9, 0, 0).unwrap();
        let mut report = RunReport::new(RunId::new(), started.date_naive(), started, false);
        report.record(&result(
            "PX_2",
            "ipca",
            TaskOutcome::Updated {
                added: 1,
                changed: 2,
                removed: 0,
            },
            2,
        ));
        report.record(&result("PX_1", "ipca", TaskOutcome::NoChange, 0));
        report.record(&result(
            "PX_3",
            "pmc",
            TaskOutcome::Failed {
                error: TaskError::FetchFailed {
                    attempts: 5,
                    reason: "HTTP 503".into(),
                },
            },
            0,
        ));
        report.record(&result(
            "PX_4",
            "pmc",
            TaskOutcome::UpdatedWithWarning {
                added: 0,
                changed: 1,
                removed: 0,
                warning: TaskError::VintageWriteFailed { reason: "disk".into() },
            },
            1,
        ));
        report.record(&result("PX_5", "pmc", TaskOutcome::Cancelled, 0));
        report.finish(RunStatus::Completed, started + chrono::Duration::minutes(3));
        report
    }

    #[test]
    fn test_tallies_per_dataset() {
        let report = sample();
        assert_eq!(
            report.datasets[&DatasetId::new("ipca")],
            DatasetTally {
                updated: 1,
                unchanged: 1,
                failed: 0,
                cancelled: 0
            }
        );
        assert_eq!(
            report.datasets[&DatasetId::new("pmc")],
            DatasetTally {
                updated: 1,
                unchanged: 0,
                failed: 1,
                cancelled: 1
            }
        );
        assert_eq!(report.totals().total(), 5);
        assert_eq!(
            report.summary(),
            "2 updated, 1 unchanged, 1 failed, 1 cancelled, 2 revised"
        );
    }

    #[test]
    fn test_revised_and_failures() {
        let report = sample();
        let revised: Vec<(&str, usize)> = report
            .revised
            .iter()
            .map(|r| (r.series_id.as_str(), r.revised_points))
            .collect();
        assert_eq!(revised, vec![("PX_2", 2), ("PX_4", 1)]);

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].kind, "fetch_failed");
        assert!(report.failures[0].retry_eligible);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.has_failures());
    }

    #[test]
    fn test_unrecorded_failure_is_not_retry_eligible() {
        let started = Utc.with_ymd_and_hms(2025, 3, 17, 9, 0, 0).unwrap();
        let mut report = RunReport::new(RunId::new(), started.date_naive(), started, false);
        let mut failed = result(
            "PX_9",
            "ipca",
            TaskOutcome::Failed {
                error: TaskError::StoreReadFailed {
                    reason: "checksum mismatch".into(),
                },
            },
            0,
        );
        failed.outcome_recorded = false;
        report.record(&failed);

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].kind, "store_read_failed");
        assert!(!report.failures[0].retry_eligible);
    }

    #[tokio::test]
    async fn test_json_sink_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonReportSink::new(dir.path().join("reports"));
        let report = sample();
        sink.publish(&report).await.unwrap();

        let results = dir.path().join("reports/update_results_2025-03-17.json");
        let parsed: RunReport =
            serde_json::from_slice(&std::fs::read(&results).unwrap()).unwrap();
        assert_eq!(parsed, report);

        let failed = dir.path().join("reports/failed_update_pmc_20250317_090300.json");
        let list: Vec<FailedSeries> = serde_json::from_slice(&std::fs::read(&failed).unwrap()).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].series_id, SeriesId::new("PX_3"));
        assert!(!dir.path().join("reports/failed_update_ipca_20250317_090300.json").exists());
    }

    #[test]
    fn test_selection_failure_counts_as_failure() {
        let now = Utc::now();
        let mut report = RunReport::new(RunId::new(), now.date_naive(), now, false);
        report.finish(RunStatus::SelectionFailed("catalog missing".into()), now);
        assert!(report.has_failures());
        assert_eq!(report.totals().total(), 0);
    }
}
