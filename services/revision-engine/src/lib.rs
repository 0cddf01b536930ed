//! Revision Engine
//!
//! Change detection and revision tracking for one series at a time:
//! - `diff`: pure comparison and merge of an old and a freshly fetched value set
//! - `vintage`: archives superseded value sets when a diff shows revisions or removals
//!
//! Nothing in `diff` performs I/O or suspends. The recorder is the only part
//! that touches the store.

pub mod diff;
pub mod vintage;

pub use diff::{diff, diff_and_merge, MergeOutcome};
pub use vintage::{VintageDecision, VintageRecorder};
