//! Scheduler
//!
//! Decides which series are due for refresh on a given date.
//! - `schedule`: declarative per-dataset calendar (primary and retry windows, priority)
//! - `policy`: due/priority/retry-window decisions per series
//! - `catalog`: source of series descriptors

pub mod catalog;
pub mod policy;
pub mod schedule;

pub use catalog::{CatalogError, JsonCatalog, SeriesCatalog, StaticCatalog};
pub use policy::{DispatchRank, DueDecision, FrequencyPolicy};
pub use schedule::{DatasetSchedule, DayWindow, PolicyConfigError, Priority, ScheduleTable};
