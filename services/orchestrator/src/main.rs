//! series-sync: run one scheduled update pass over the series catalog.
//!
//! ```bash
//! series-sync --config sync.toml
//! series-sync --date 2025-03-17 --dataset ipca --dataset pnadct --dry-run
//! ```
//!
//! Exit status is 0 when every task succeeded, 1 when some series failed
//! or the run was cancelled, and an error when selection failed.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};
use types::clock::{Clock, SystemClock};
use types::ids::DatasetId;

use fetch_client::{FetchClient, RequestLimiter, SidraUpstream};
use orchestrator::{
    cancel_pair, AppConfig, JsonReportSink, LogReportSink, Orchestrator, Pipeline, ReportSink, RunStatus,
};
use scheduler::{FrequencyPolicy, JsonCatalog};
use series_store::FileStore;

#[derive(Parser, Debug)]
#[command(name = "series-sync")]
#[command(about = "Incremental update run for versioned statistical series", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Run as of this date instead of today (YYYY-MM-DD)
    #[arg(long)]
    date: Option<NaiveDate>,

    /// Only update these datasets (repeatable)
    #[arg(long = "dataset")]
    datasets: Vec<String>,

    /// Worker pool size
    #[arg(long)]
    workers: Option<usize>,

    /// Fetch and diff without writing anything
    #[arg(long)]
    dry_run: bool,

    /// Catalog export (JSON)
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Store root directory
    #[arg(long)]
    store_dir: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Fetch every series in full
    #[arg(long)]
    force_full: bool,

    /// Cancel the run after this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,
}

impl Cli {
    fn apply(&self, mut config: AppConfig) -> AppConfig {
        if !self.datasets.is_empty() {
            config.run.datasets = self.datasets.iter().map(DatasetId::new).collect();
        }
        if let Some(workers) = self.workers {
            config.run.concurrency = workers;
        }
        if self.dry_run {
            config.run.dry_run = true;
        }
        if self.force_full {
            config.run.force_full = true;
        }
        if let Some(secs) = self.timeout_secs {
            config.run.timeout_secs = Some(secs);
        }
        if let Some(path) = &self.catalog {
            config.catalog.path = path.clone();
        }
        if let Some(dir) = &self.store_dir {
            config.store.root = dir.clone();
        }
        if self.json_logs {
            config.logging.json = true;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    }
    .context("loading configuration")?;
    let config = cli.apply(loaded).normalize();
    config.validate().context("invalid configuration")?;

    orchestrator::logging::init_tracing(&config.logging).map_err(anyhow::Error::msg)?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let as_of = cli.date.unwrap_or_else(|| clock.today());
    let table = config.schedule_table()?;

    let store = Arc::new(FileStore::open(config.store.clone()).context("opening store")?);
    let upstream = SidraUpstream::new(config.fetch.sidra.clone()).context("building HTTP client")?;
    let fetcher = FetchClient::new(
        upstream,
        Arc::new(RequestLimiter::new(config.fetch.limiter.clone())),
        config.fetch.retry.clone(),
        Arc::clone(&clock),
    );
    let catalog = Arc::new(JsonCatalog::new(config.catalog.path.clone(), table.clone()));

    let pipeline = Pipeline::new(fetcher, store, Arc::clone(&clock), config.run.dry_run);
    let orchestrator = Orchestrator::new(
        catalog,
        FrequencyPolicy::new(table),
        pipeline,
        Arc::clone(&clock),
        config.run.clone(),
    );

    let (handle, token) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling run");
            handle.cancel();
        }
    });

    let report = orchestrator.run(as_of, token).await;

    let mut sinks: Vec<Box<dyn ReportSink>> = vec![Box::new(LogReportSink)];
    if let Some(dir) = &config.report.dir {
        sinks.push(Box::new(JsonReportSink::new(dir.clone())));
    }
    for sink in &sinks {
        if let Err(e) = sink.publish(&report).await {
            warn!(error = %e, "report sink failed");
        }
    }

    match &report.status {
        RunStatus::SelectionFailed(reason) => bail!("selection failed: {}", reason),
        RunStatus::Cancelled => {
            info!("run cancelled");
            Ok(ExitCode::FAILURE)
        }
        RunStatus::Completed if report.has_failures() => Ok(ExitCode::FAILURE),
        RunStatus::Completed => Ok(ExitCode::SUCCESS),
    }
}
