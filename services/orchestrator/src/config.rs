//! Run configuration
//!
//! Loaded in three layers, later layers winning:
//! 1. compiled defaults (`AppConfig::default()`)
//! 2. an optional TOML file
//! 3. `SERIES_SYNC_`-prefixed environment variables, `__` separating
//!    nested keys (`SERIES_SYNC_RUN__CONCURRENCY=8`)
//!
//! Command-line flags are applied on top by the binary.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use types::ids::DatasetId;

use fetch_client::{LimiterConfig, RetryPolicy, SidraConfig};
use scheduler::{DatasetSchedule, PolicyConfigError, ScheduleTable};
use series_store::FileStoreConfig;

pub const ENV_PREFIX: &str = "SERIES_SYNC_";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] figment::Error),

    #[error("concurrency must be at least 1")]
    InvalidConcurrency,

    #[error("run timeout must be positive")]
    InvalidTimeout,

    #[error("fetch limiter: {0}")]
    InvalidLimiter(String),

    #[error("schedule table: {0}")]
    Schedule(#[from] PolicyConfigError),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub run: RunConfig,
    pub catalog: CatalogConfig,
    pub store: FileStoreConfig,
    pub fetch: FetchConfig,
    pub schedule: ScheduleConfig,
    pub report: ReportConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Worker pool size.
    pub concurrency: usize,
    /// Fetch and diff only; nothing is written.
    pub dry_run: bool,
    /// Restrict the run to these datasets; empty means all.
    pub datasets: Vec<DatasetId>,
    /// Fetch every series in full regardless of its schedule class.
    pub force_full: bool,
    /// Cancel the run after this many seconds.
    pub timeout_secs: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            dry_run: false,
            datasets: Vec::new(),
            force_full: false,
            timeout_secs: None,
        }
    }
}

impl RunConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub path: PathBuf,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("catalog.json"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub retry: RetryPolicy,
    pub limiter: LimiterConfig,
    pub sidra: SidraConfig,
}

/// Adjustments to the built-in dataset calendar.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Added or replaced dataset entries.
    pub overrides: BTreeMap<DatasetId, DatasetSchedule>,
    /// Datasets whose series are always fetched in full.
    pub revision_sensitive: Vec<DatasetId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Directory for JSON run reports; `None` logs the report only.
    pub dir: Option<PathBuf>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            dir: Some(PathBuf::from("reports")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub json: bool,
    /// Fallback filter when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            json: false,
            filter: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Defaults overlaid with the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::figment(None).extract().map_err(ConfigError::from)
    }

    /// Defaults overlaid with a TOML file, then the environment.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::figment(Some(path.as_ref()))
            .extract()
            .map_err(ConfigError::from)
    }

    fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Lowercase dataset names coming from files and flags.
    pub fn normalize(mut self) -> Self {
        self.run.datasets = self
            .run
            .datasets
            .iter()
            .map(|d| DatasetId::new(d.as_str()))
            .collect();
        self.schedule.revision_sensitive = self
            .schedule
            .revision_sensitive
            .iter()
            .map(|d| DatasetId::new(d.as_str()))
            .collect();
        self.schedule.overrides = std::mem::take(&mut self.schedule.overrides)
            .into_iter()
            .map(|(d, s)| (DatasetId::new(d.as_str()), s))
            .collect();
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.run.concurrency == 0 {
            return Err(ConfigError::InvalidConcurrency);
        }
        if self.run.timeout_secs == Some(0) {
            return Err(ConfigError::InvalidTimeout);
        }
        let limiter = &self.fetch.limiter;
        if limiter.max_in_flight == 0 {
            return Err(ConfigError::InvalidLimiter("max_in_flight must be at least 1".into()));
        }
        let rate = limiter.requests_per_second;
        if limiter.burst == 0 || rate.is_nan() || rate <= 0.0 {
            return Err(ConfigError::InvalidLimiter(
                "burst and requests_per_second must be positive".into(),
            ));
        }
        self.schedule_table()?;
        Ok(())
    }

    /// Built-in calendar with configured overrides and revision-sensitive flags applied.
    pub fn schedule_table(&self) -> Result<ScheduleTable, ConfigError> {
        let table = ScheduleTable::builtin()
            .with_overrides(self.schedule.overrides.clone())?
            .with_revision_sensitive(&self.schedule.revision_sensitive);
        Ok(table)
    }
}
