//! Ranking of summarized series

use crate::analytics::models::RankedSeries;

/// Sort by count descending. `sort_by` is stable, so equal counts keep the
/// order the aggregation pass produced; chart axes depend on that.
pub fn rank(mut series: RankedSeries) -> RankedSeries {
    series.entries.sort_by(|a, b| b.1.cmp(&a.1));
    series
}
