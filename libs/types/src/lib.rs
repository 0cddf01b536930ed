//! Types library for the incremental series update engine
//!
//! This library provides the shared vocabulary used by every service in the
//! workspace: series identity, calendar periods, value sets, change reports,
//! vintages and the error taxonomy for per-series update work.
//!
//! # Modules
//! - `ids`: Identifiers (SeriesId, DatasetId, VintageId, RunId)
//! - `period`: Normalized calendar keys (day, month, quarter)
//! - `values`: Nullable decimal values and chronologically ordered value sets
//! - `report`: Structured change reports produced by a diff
//! - `vintage`: Immutable archived versions of a series
//! - `series`: Series descriptors, scope, frequency and stored metadata
//! - `clock`: Injectable wall clock
//! - `errors`: Error taxonomy

pub mod ids;
pub mod period;
pub mod values;
pub mod report;
pub mod vintage;
pub mod series;
pub mod clock;
pub mod errors;

// Library version constant
pub const LIB_VERSION: &str = "1.0.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::clock::*;
    pub use crate::errors::*;
    pub use crate::ids::*;
    pub use crate::period::*;
    pub use crate::report::*;
    pub use crate::series::*;
    pub use crate::values::*;
    pub use crate::vintage::*;
}
