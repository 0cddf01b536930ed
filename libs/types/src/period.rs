//! Normalized calendar keys for series observations
//!
//! A `Period` is unique within a series and totally ordered chronologically
//! within one kind. Canonical text forms:
//!
//! ```text
//! Day      2025-01-31
//! Month    2025-01
//! Quarter  2025-Q1
//! ```
//!
//! Upstream tables encode periods as compact codes (`202501` for a month,
//! `202501` for the first quarter, `20250131` for a day); `from_source_code`
//! and `to_source_code` convert between the two representations.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PeriodError {
    #[error("Malformed period '{0}'")]
    Malformed(String),

    #[error("Month out of range: {0}")]
    MonthOutOfRange(u32),

    #[error("Quarter out of range: {0}")]
    QuarterOutOfRange(u32),

    #[error("Invalid calendar date '{0}'")]
    InvalidDate(String),
}

/// Granularity of a period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodKind {
    Day,
    Month,
    Quarter,
}

/// One calendar key. Ordering is chronological for periods of the same kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Period {
    Day(NaiveDate),
    Month { year: i32, month: u32 },
    Quarter { year: i32, quarter: u32 },
}

impl Period {
    pub fn day(date: NaiveDate) -> Self {
        Period::Day(date)
    }

    pub fn month(year: i32, month: u32) -> Result<Self, PeriodError> {
        if !(1..=12).contains(&month) {
            return Err(PeriodError::MonthOutOfRange(month));
        }
        Ok(Period::Month { year, month })
    }

    pub fn quarter(year: i32, quarter: u32) -> Result<Self, PeriodError> {
        if !(1..=4).contains(&quarter) {
            return Err(PeriodError::QuarterOutOfRange(quarter));
        }
        Ok(Period::Quarter { year, quarter })
    }

    pub fn kind(&self) -> PeriodKind {
        match self {
            Period::Day(_) => PeriodKind::Day,
            Period::Month { .. } => PeriodKind::Month,
            Period::Quarter { .. } => PeriodKind::Quarter,
        }
    }

    /// The period of the given kind that contains `date`.
    pub fn current(kind: PeriodKind, date: NaiveDate) -> Self {
        match kind {
            PeriodKind::Day => Period::Day(date),
            PeriodKind::Month => Period::Month {
                year: date.year(),
                month: date.month(),
            },
            PeriodKind::Quarter => Period::Quarter {
                year: date.year(),
                quarter: (date.month() - 1) / 3 + 1,
            },
        }
    }

    /// First calendar day covered by this period.
    pub fn start_date(&self) -> Option<NaiveDate> {
        match *self {
            Period::Day(d) => Some(d),
            Period::Month { year, month } => NaiveDate::from_ymd_opt(year, month, 1),
            Period::Quarter { year, quarter } => {
                NaiveDate::from_ymd_opt(year, (quarter - 1) * 3 + 1, 1)
            }
        }
    }

    /// Parse an upstream period code for a series of the given kind.
    ///
    /// Accepts `YYYYMM` (month), `YYYY0Q` or `YYYYQ` (quarter),
    /// `YYYYMMDD` or `DD/MM/YYYY` (day).
    pub fn from_source_code(code: &str, kind: PeriodKind) -> Result<Self, PeriodError> {
        let code = code.trim();
        let malformed = || PeriodError::Malformed(code.to_string());

        match kind {
            PeriodKind::Month => {
                if code.len() != 6 || !code.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(malformed());
                }
                let year = code[..4].parse().map_err(|_| malformed())?;
                let month = code[4..].parse().map_err(|_| malformed())?;
                Period::month(year, month)
            }
            PeriodKind::Quarter => {
                if !(code.len() == 5 || code.len() == 6) || !code.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(malformed());
                }
                let year = code[..4].parse().map_err(|_| malformed())?;
                let quarter = code[4..].parse().map_err(|_| malformed())?;
                Period::quarter(year, quarter)
            }
            PeriodKind::Day => {
                let date = if code.contains('/') {
                    NaiveDate::parse_from_str(code, "%d/%m/%Y")
                } else {
                    NaiveDate::parse_from_str(code, "%Y%m%d")
                }
                .map_err(|_| PeriodError::InvalidDate(code.to_string()))?;
                Ok(Period::Day(date))
            }
        }
    }

    /// Compact upstream code for this period (inverse of `from_source_code`).
    pub fn to_source_code(&self) -> String {
        match *self {
            Period::Day(d) => d.format("%Y%m%d").to_string(),
            Period::Month { year, month } => format!("{:04}{:02}", year, month),
            Period::Quarter { year, quarter } => format!("{:04}{:02}", year, quarter),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Period::Day(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Period::Month { year, month } => write!(f, "{:04}-{:02}", year, month),
            Period::Quarter { year, quarter } => write!(f, "{:04}-Q{}", year, quarter),
        }
    }
}

impl FromStr for Period {
    type Err = PeriodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let malformed = || PeriodError::Malformed(s.to_string());

        let (year_part, rest) = s.split_once('-').ok_or_else(malformed)?;
        if year_part.len() != 4 {
            return Err(malformed());
        }
        let year: i32 = year_part.parse().map_err(|_| malformed())?;

        if let Some(q) = rest.strip_prefix('Q').or_else(|| rest.strip_prefix('q')) {
            let quarter = q.parse().map_err(|_| malformed())?;
            return Period::quarter(year, quarter);
        }

        match rest.len() {
            2 => {
                let month = rest.parse().map_err(|_| malformed())?;
                Period::month(year, month)
            }
            5 => NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map(Period::Day)
                .map_err(|_| PeriodError::InvalidDate(s.to_string())),
            _ => Err(malformed()),
        }
    }
}

impl Serialize for Period {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Period {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
