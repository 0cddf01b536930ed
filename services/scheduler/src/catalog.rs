//! Series catalog port
//!
//! The catalog is read-only to the update engine. `JsonCatalog` reads the
//! flat catalog export, a JSON array of records like
//!
//! ```json
//! { "px_code": "PX_IPCA_1", "dataset": "ipca",
//!   "api_url": "https://apisidra.ibge.gov.br/values/t/1737/n1/all/v/63/p/all",
//!   "label": "IPCA - Brasil" }
//! ```
//!
//! Scope comes from the territorial level in the query and frequency from
//! the dataset calendar unless the record states one.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, warn};
use types::ids::{DatasetId, SeriesId};
use types::series::{Frequency, Scope, SeriesDescriptor, SourceQuery};

use crate::schedule::ScheduleTable;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("catalog unreadable at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("catalog is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("catalog unavailable: {0}")]
    Unavailable(String),
}

/// Source of series descriptors for a run.
#[async_trait]
pub trait SeriesCatalog: Send + Sync {
    /// All series that may be considered for a run on `as_of`.
    async fn list_due(&self, as_of: NaiveDate) -> Result<Vec<SeriesDescriptor>, CatalogError>;
}

/// Fixed in-memory catalog.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    series: Vec<SeriesDescriptor>,
}

impl StaticCatalog {
    pub fn new(series: Vec<SeriesDescriptor>) -> Self {
        Self { series }
    }
}

#[async_trait]
impl SeriesCatalog for StaticCatalog {
    async fn list_due(&self, _as_of: NaiveDate) -> Result<Vec<SeriesDescriptor>, CatalogError> {
        Ok(self.series.clone())
    }
}

/// One record of the flat catalog export. Unknown fields are ignored.
#[derive(Debug, Clone, Deserialize)]
struct CatalogRecord {
    px_code: String,
    dataset: String,
    api_url: String,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    frequency: Option<Frequency>,
    #[serde(default)]
    supports_range: Option<bool>,
}

/// Catalog backed by the flat JSON export on disk.
#[derive(Debug, Clone)]
pub struct JsonCatalog {
    path: PathBuf,
    table: ScheduleTable,
}

impl JsonCatalog {
    pub fn new(path: impl Into<PathBuf>, table: ScheduleTable) -> Self {
        Self {
            path: path.into(),
            table,
        }
    }

    /// Parse catalog text. Records without an identifier or query are skipped.
    pub fn parse(&self, text: &str) -> Result<Vec<SeriesDescriptor>, CatalogError> {
        let records: Vec<CatalogRecord> = serde_json::from_str(text)?;
        let total = records.len();
        let mut descriptors = Vec::with_capacity(total);

        for (index, record) in records.into_iter().enumerate() {
            match self.to_descriptor(record) {
                Some(d) => descriptors.push(d),
                None => warn!(index, "skipping catalog record without px_code or api_url"),
            }
        }
        if descriptors.len() < total {
            warn!(skipped = total - descriptors.len(), "catalog records skipped");
        }
        Ok(descriptors)
    }

    fn to_descriptor(&self, record: CatalogRecord) -> Option<SeriesDescriptor> {
        let id = SeriesId::try_new(record.px_code.trim())?;
        if record.api_url.trim().is_empty() {
            return None;
        }
        let dataset = DatasetId::new(record.dataset);
        let query = SourceQuery::new(record.api_url.trim());
        let frequency = record
            .frequency
            .or_else(|| self.table.get(&dataset).map(|s| s.frequency))
            .unwrap_or(Frequency::Monthly);

        Some(SeriesDescriptor {
            id,
            scope: Scope::from_query(&query),
            dataset,
            frequency,
            query,
            supports_range: record.supports_range.unwrap_or(true),
            label: record.label,
        })
    }
}

#[async_trait]
impl SeriesCatalog for JsonCatalog {
    async fn list_due(&self, as_of: NaiveDate) -> Result<Vec<SeriesDescriptor>, CatalogError> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| CatalogError::Io {
                path: self.path.display().to_string(),
                source,
            })?;
        let descriptors = self.parse(&text)?;
        info!(
            path = %self.path.display(),
            %as_of,
            series = descriptors.len(),
            "catalog loaded"
        );
        Ok(descriptors)
    }
}
