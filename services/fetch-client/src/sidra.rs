//! SIDRA-style table upstream over HTTP
//!
//! Responses are a JSON array of flat objects. The first object is a header
//! mapping column keys to labels; every following object is one row:
//!
//! ```json
//! [ {"NC": "Nível Territorial (Código)", "V": "Valor", "D3C": "Mês (Código)", ...},
//!   {"NC": "1", "V": "0.54", "D3C": "202501", ...} ]
//! ```
//!
//! The period column is the first code column (`D<n>C`) whose label names a
//! time unit. The value column is `V`. Not-available markers become null points.

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;
use types::period::{Period, PeriodKind};
use types::series::SourceQuery;
use types::values::ValueSet;

use crate::upstream::{Upstream, UpstreamError};

const VALUE_COLUMN: &str = "V";
const NOT_AVAILABLE: [&str; 5] = ["", "..", "...", "-", "X"];
const PERIOD_LABELS: [&str; 8] = [
    "mês", "mes", "trimestre", "ano", "período", "periodo", "semestre", "data",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SidraConfig {
    /// Prefix for queries that are paths rather than full URLs.
    pub base_url: String,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for SidraConfig {
    fn default() -> Self {
        Self {
            base_url: "https://apisidra.ibge.gov.br/values".to_string(),
            timeout_secs: 120,
            user_agent: concat!("series-sync/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

pub struct SidraUpstream {
    client: Client,
    config: SidraConfig,
}

impl SidraUpstream {
    pub fn new(config: SidraConfig) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| UpstreamError::Connection(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn url_for(&self, query: &SourceQuery) -> String {
        let q = query.as_str();
        if q.starts_with("http://") || q.starts_with("https://") {
            q.to_string()
        } else {
            format!("{}/{}", self.config.base_url.trim_end_matches('/'), q.trim_start_matches('/'))
        }
    }
}

#[async_trait]
impl Upstream for SidraUpstream {
    fn name(&self) -> &str {
        "sidra"
    }

    async fn query(&self, query: &SourceQuery, kind: PeriodKind) -> Result<ValueSet, UpstreamError> {
        let url = self.url_for(query);
        debug!(%url, "upstream request");

        let response = self.client.get(&url).send().await.map_err(classify_transport)?;
        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            let message = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                retry_after,
                message: truncate(&message, 200),
            });
        }

        let body = response.text().await.map_err(classify_transport)?;
        parse_table(&body, kind)
    }
}

fn classify_transport(err: reqwest::Error) -> UpstreamError {
    if err.is_timeout() {
        UpstreamError::Timeout
    } else if let Some(status) = err.status() {
        UpstreamError::Status {
            status: status.as_u16(),
            retry_after: None,
            message: err.to_string(),
        }
    } else if err.is_decode() {
        UpstreamError::Malformed(err.to_string())
    } else {
        UpstreamError::Connection(err.to_string())
    }
}

/// `Retry-After` in delta-seconds. HTTP-date values are ignored.
pub fn parse_retry_after(raw: &str) -> Option<Duration> {
    raw.trim().parse::<u64>().ok().map(Duration::from_secs)
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Parse a table response body into a value set.
pub fn parse_table(body: &str, kind: PeriodKind) -> Result<ValueSet, UpstreamError> {
    let rows: Vec<Map<String, Json>> =
        serde_json::from_str(body).map_err(|e| UpstreamError::Malformed(e.to_string()))?;

    let Some((header, data)) = rows.split_first() else {
        return Err(UpstreamError::Malformed("empty table".to_string()));
    };
    // Header only: nothing published in the requested range
    if data.is_empty() {
        return Ok(ValueSet::new());
    }

    let period_key = period_column(header)
        .ok_or_else(|| UpstreamError::Malformed("no period column in header".to_string()))?;

    let mut values = ValueSet::new();
    for row in data {
        let code = row
            .get(&period_key)
            .and_then(Json::as_str)
            .ok_or_else(|| UpstreamError::Malformed(format!("row without {}", period_key)))?;
        let period = Period::from_source_code(code, kind)
            .map_err(|e| UpstreamError::Malformed(e.to_string()))?;
        let value = parse_value(row.get(VALUE_COLUMN))?;
        values.insert(period, value);
    }
    Ok(values)
}

fn period_column(header: &Map<String, Json>) -> Option<String> {
    let mut keys: Vec<&String> = header.keys().collect();
    keys.sort();
    keys.into_iter()
        .filter(|k| k.starts_with('D') && k.ends_with('C'))
        .find(|k| {
            header
                .get(k.as_str())
                .and_then(Json::as_str)
                .map(|label| {
                    let label = label.to_lowercase();
                    PERIOD_LABELS.iter().any(|word| label.contains(word))
                })
                .unwrap_or(false)
        })
        .cloned()
}

fn parse_value(raw: Option<&Json>) -> Result<Option<Decimal>, UpstreamError> {
    match raw {
        None | Some(Json::Null) => Ok(None),
        Some(Json::String(s)) => {
            let s = s.trim();
            if NOT_AVAILABLE.contains(&s) {
                return Ok(None);
            }
            Decimal::from_str(s)
                .or_else(|_| Decimal::from_scientific(s))
                .map(Some)
                .map_err(|_| UpstreamError::Malformed(format!("unparseable value {:?}", s)))
        }
        Some(Json::Number(n)) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .map(Some)
            .map_err(|_| UpstreamError::Malformed(format!("unparseable value {}", n))),
        Some(other) => Err(UpstreamError::Malformed(format!("unexpected value {}", other))),
    }
}
