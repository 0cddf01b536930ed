//! Declarative per-dataset publication calendar
//!
//! Each dataset maps to a frequency class with a primary window of days in
//! which it is refreshed unconditionally and a following retry window in
//! which only series whose last run failed are picked up. Quarterly datasets
//! additionally restrict both windows to their release months.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use types::ids::DatasetId;
use types::series::Frequency;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyConfigError {
    #[error("{dataset}: day window {start}..={end} is outside 1..=31 or reversed")]
    InvalidDayWindow { dataset: String, start: u32, end: u32 },

    #[error("{dataset}: month {month} is outside 1..=12")]
    InvalidMonth { dataset: String, month: u32 },

    #[error("{dataset}: primary window {primary} overlaps retry window {retry}")]
    OverlappingWindows {
        dataset: String,
        primary: DayWindow,
        retry: DayWindow,
    },

    #[error("{dataset}: quarterly schedule needs at least one release month")]
    MissingMonths { dataset: String },
}

/// Dispatch tier. Declaration order is dispatch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::High => write!(f, "high"),
            Priority::Medium => write!(f, "medium"),
            Priority::Low => write!(f, "low"),
        }
    }
}

/// Inclusive range of days of the month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayWindow {
    pub start: u32,
    pub end: u32,
}

impl DayWindow {
    pub const fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Every day of any month.
    pub const ALL_MONTH: DayWindow = DayWindow::new(1, 31);

    pub fn contains(&self, day: u32) -> bool {
        (self.start..=self.end).contains(&day)
    }

    pub fn overlaps(&self, other: &DayWindow) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    fn is_valid(&self) -> bool {
        self.start >= 1 && self.end <= 31 && self.start <= self.end
    }
}

impl fmt::Display for DayWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Refresh calendar of one dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSchedule {
    pub frequency: Frequency,
    pub primary: DayWindow,
    /// `None` for datasets refreshed every day.
    #[serde(default)]
    pub retry: Option<DayWindow>,
    /// Release months for quarterly datasets; ignored otherwise.
    #[serde(default)]
    pub months: Vec<u32>,
    pub priority: Priority,
    /// Always fetch the full history so revisions outside the latest window are seen.
    #[serde(default)]
    pub revision_sensitive: bool,
}

impl DatasetSchedule {
    pub fn monthly(primary: DayWindow, retry: DayWindow, priority: Priority) -> Self {
        Self {
            frequency: Frequency::Monthly,
            primary,
            retry: Some(retry),
            months: Vec::new(),
            priority,
            revision_sensitive: false,
        }
    }

    pub fn quarterly(months: &[u32], primary: DayWindow, retry: DayWindow, priority: Priority) -> Self {
        Self {
            frequency: Frequency::Quarterly,
            primary,
            retry: Some(retry),
            months: months.to_vec(),
            priority,
            revision_sensitive: false,
        }
    }

    pub fn daily(priority: Priority) -> Self {
        Self {
            frequency: Frequency::Daily,
            primary: DayWindow::ALL_MONTH,
            retry: None,
            months: Vec::new(),
            priority,
            revision_sensitive: false,
        }
    }

    /// Fallback calendar for datasets missing from the table.
    pub fn default_for(frequency: Frequency) -> Self {
        match frequency {
            Frequency::Daily => Self::daily(Priority::Low),
            Frequency::Monthly => {
                Self::monthly(DayWindow::new(15, 20), DayWindow::new(21, 23), Priority::Low)
            }
            Frequency::Quarterly => Self::quarterly(
                &[2, 5, 8, 11],
                DayWindow::new(15, 20),
                DayWindow::new(21, 25),
                Priority::Low,
            ),
        }
    }

    pub fn revision_sensitive(mut self) -> Self {
        self.revision_sensitive = true;
        self
    }

    /// Whether `month` is a release month (always true outside quarterly schedules).
    pub fn in_release_month(&self, month: u32) -> bool {
        self.frequency != Frequency::Quarterly || self.months.contains(&month)
    }

    pub fn validate(&self, dataset: &str) -> Result<(), PolicyConfigError> {
        let windows = std::iter::once(self.primary).chain(self.retry);
        for w in windows {
            if !w.is_valid() {
                return Err(PolicyConfigError::InvalidDayWindow {
                    dataset: dataset.to_string(),
                    start: w.start,
                    end: w.end,
                });
            }
        }
        if let Some(retry) = self.retry {
            if self.primary.overlaps(&retry) {
                return Err(PolicyConfigError::OverlappingWindows {
                    dataset: dataset.to_string(),
                    primary: self.primary,
                    retry,
                });
            }
        }
        if let Some(&month) = self.months.iter().find(|m| !(1..=12).contains(*m)) {
            return Err(PolicyConfigError::InvalidMonth {
                dataset: dataset.to_string(),
                month,
            });
        }
        if self.frequency == Frequency::Quarterly && self.months.is_empty() {
            return Err(PolicyConfigError::MissingMonths {
                dataset: dataset.to_string(),
            });
        }
        Ok(())
    }
}

/// Dataset → schedule table, with per-frequency fallbacks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScheduleTable {
    datasets: BTreeMap<DatasetId, DatasetSchedule>,
}

impl Default for ScheduleTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ScheduleTable {
    pub fn empty() -> Self {
        Self {
            datasets: BTreeMap::new(),
        }
    }

    /// The production publication calendar.
    pub fn builtin() -> Self {
        use Priority::*;
        let mid_month = |p| DatasetSchedule::monthly(DayWindow::new(15, 20), DayWindow::new(21, 23), p);

        let entries = [
            ("ipca", mid_month(High)),
            ("inpc", mid_month(High)),
            ("ipca15", DatasetSchedule::monthly(DayWindow::new(20, 25), DayWindow::new(26, 28), High)),
            ("ipp", mid_month(Medium)),
            ("pimpf", DatasetSchedule::monthly(DayWindow::new(5, 10), DayWindow::new(11, 13), Medium)),
            ("pmc", mid_month(Medium)),
            ("pms", mid_month(Medium)),
            ("lspa", DatasetSchedule::monthly(DayWindow::new(10, 15), DayWindow::new(16, 18), Low)),
            ("pnadcm", mid_month(High)),
            (
                "pnadct",
                DatasetSchedule::quarterly(&[2, 5, 8, 11], DayWindow::new(15, 20), DayWindow::new(21, 25), High),
            ),
            ("stn", DatasetSchedule::monthly(DayWindow::new(1, 7), DayWindow::new(8, 10), High)),
            ("bacen", DatasetSchedule::daily(High)),
        ];

        Self {
            datasets: entries
                .into_iter()
                .map(|(name, schedule)| (DatasetId::new(name), schedule))
                .collect(),
        }
    }

    /// Add or replace entries, then validate the whole table.
    pub fn with_overrides(
        mut self,
        overrides: BTreeMap<DatasetId, DatasetSchedule>,
    ) -> Result<Self, PolicyConfigError> {
        self.datasets.extend(overrides);
        self.validate()?;
        Ok(self)
    }

    /// Mark datasets whose series must always be fetched in full.
    pub fn with_revision_sensitive<'a>(mut self, datasets: impl IntoIterator<Item = &'a DatasetId>) -> Self {
        for dataset in datasets {
            if let Some(schedule) = self.datasets.get_mut(dataset) {
                schedule.revision_sensitive = true;
            }
        }
        self
    }

    pub fn validate(&self) -> Result<(), PolicyConfigError> {
        for (dataset, schedule) in &self.datasets {
            schedule.validate(dataset.as_str())?;
        }
        Ok(())
    }

    /// Configured schedule of a dataset, if any.
    pub fn get(&self, dataset: &DatasetId) -> Option<&DatasetSchedule> {
        self.datasets.get(dataset)
    }

    /// Schedule for a dataset, falling back to the frequency default.
    pub fn resolve(&self, dataset: &DatasetId, frequency: Frequency) -> DatasetSchedule {
        self.datasets
            .get(dataset)
            .cloned()
            .unwrap_or_else(|| DatasetSchedule::default_for(frequency))
    }

    pub fn datasets(&self) -> impl Iterator<Item = (&DatasetId, &DatasetSchedule)> {
        self.datasets.iter()
    }
}
