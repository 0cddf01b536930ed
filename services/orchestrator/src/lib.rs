//! Update Orchestrator
//!
//! Drives scheduled update runs: selects due series from the catalog, runs
//! each through the fetch → diff/merge → vintage → store pipeline under a
//! bounded worker pool, and aggregates a run report.
//!
//! # Modules
//! - `orchestrator`: selection, phased dispatch and aggregation
//! - `pipeline`: the isolated per-series update task
//! - `report`: run report and its sinks
//! - `cancel`: run cancellation and timeout
//! - `config`: layered configuration
//! - `logging`: tracing subscriber bootstrap

pub mod cancel;
pub mod config;
pub mod logging;
pub mod orchestrator;
pub mod pipeline;
pub mod report;

pub use cancel::{cancel_pair, CancelHandle, CancelToken};
pub use config::{AppConfig, ConfigError, RunConfig};
pub use orchestrator::{plan, DatasetPhases, DispatchPlan, Orchestrator};
pub use pipeline::{Fetcher, Pipeline, TaskOutcome, TaskResult, UpdateTask};
pub use report::{
    DatasetTally, FailedSeries, JsonReportSink, LogReportSink, ReportError, ReportSink, RevisedSeries,
    RunReport, RunStatus,
};
