//! Range rewriting of source queries
//!
//! Table queries carry their period selection in a `/p/<spec>` path segment
//! (`/p/all`, `/p/last 12`, `/p/202401-202412`). A ranged query replaces that
//! segment with `/p/<since>-<until>` using upstream period codes; both ends
//! are inclusive.

use types::period::Period;
use types::series::SourceQuery;

const PERIOD_SEGMENT: &str = "/p/";

/// Rewrite `query` to cover `since..=until`.
///
/// Returns `None` when the query has no period segment to restrict.
pub fn with_range(query: &SourceQuery, since: Period, until: Period) -> Option<SourceQuery> {
    let raw = query.as_str();
    let start = raw.find(PERIOD_SEGMENT)? + PERIOD_SEGMENT.len();
    let end = raw[start..]
        .find(|c| c == '/' || c == '?')
        .map(|i| start + i)
        .unwrap_or(raw.len());

    let until = if until < since { since } else { until };
    let range = format!("{}-{}", since.to_source_code(), until.to_source_code());

    let mut rewritten = String::with_capacity(raw.len() + range.len());
    rewritten.push_str(&raw[..start]);
    rewritten.push_str(&range);
    rewritten.push_str(&raw[end..]);
    Some(SourceQuery::new(rewritten))
}
