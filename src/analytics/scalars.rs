//! Event-level scalar metrics
//!
//! All watch-time values are minutes. Vendor figures are converted on the way
//! in (see [`KpiStats`]), so nothing here deals with seconds.

use crate::analytics::grouping::distinct;
use crate::analytics::models::{Metric, ScalarBlock, ViewerRecord, WatchTime};
use crate::analytics::normalizer::KpiStats;

/// Render minutes as `"{h}h {m}m"`, or `"{m}m"` under an hour.
/// Fractions are truncated; negative and non-finite inputs render as `"0m"`.
pub fn format_duration(minutes: f64) -> String {
    let total = if minutes.is_finite() && minutes > 0.0 {
        minutes.trunc() as u64
    } else {
        0
    };

    let (hours, mins) = (total / 60, total % 60);
    if hours > 0 {
        format!("{}h {}m", hours, mins)
    } else {
        format!("{}m", mins)
    }
}

/// Middle element of the expanded histogram sequence (index `len / 2`).
///
/// The vendor histogram uses 5-minute buckets, so this is an approximation of
/// the true median; it is always one of the bucket values.
pub fn histogram_median(histogram: &[(u64, u64)]) -> Option<u64> {
    let len = histogram_viewers(histogram);
    if len == 0 {
        return None;
    }

    // Walk the buckets instead of materializing `count` copies of each value.
    let target = len / 2;
    let mut seen = 0u64;
    for (minute, count) in histogram {
        seen = seen.saturating_add(*count);
        if target < seen {
            return Some(*minute);
        }
    }
    None
}

pub fn histogram_total(histogram: &[(u64, u64)]) -> f64 {
    histogram
        .iter()
        .map(|(minute, count)| (*minute as f64) * (*count as f64))
        .sum()
}

/// Viewer count across all buckets. Counts come from the vendor unchecked,
/// so the sum saturates instead of overflowing.
fn histogram_viewers(histogram: &[(u64, u64)]) -> u64 {
    histogram
        .iter()
        .fold(0u64, |total, (_, count)| total.saturating_add(*count))
}

pub fn histogram_average(histogram: &[(u64, u64)]) -> Option<f64> {
    let viewers = histogram_viewers(histogram);
    (viewers > 0).then(|| histogram_total(histogram) / viewers as f64)
}

/// Median of a list of minute values, same floor-index rule as the histogram
pub fn list_median(values: &[u64]) -> Option<u64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    Some(sorted[sorted.len() / 2])
}

/// Highest number of viewers watching at the same instant.
///
/// Each record spans `[started_at, timestamp)`. At equal instants departures
/// are applied before arrivals; a zero-length stay arrives and then leaves.
/// Records without a timestamp are skipped and `None` is returned when no
/// record has one.
pub fn peak_concurrency(records: &[ViewerRecord]) -> Option<u64> {
    const DEPART: u8 = 0;
    const ARRIVE: u8 = 1;
    const DEPART_SAME_INSTANT: u8 = 2;

    let mut edges: Vec<(chrono::NaiveDateTime, u8)> = Vec::with_capacity(records.len() * 2);
    for record in records {
        let (Some(start), Some(end)) = (record.started_at(), record.timestamp) else {
            continue;
        };
        edges.push((start, ARRIVE));
        edges.push((end, if start < end { DEPART } else { DEPART_SAME_INSTANT }));
    }

    if edges.is_empty() {
        return None;
    }

    edges.sort_unstable();

    let mut current = 0u64;
    let mut peak = 0u64;
    for (_, kind) in edges {
        if kind == ARRIVE {
            current += 1;
            peak = peak.max(current);
        } else {
            current = current.saturating_sub(1);
        }
    }

    Some(peak)
}

/// Derive the scalar block for an event
pub fn derive_scalars(records: &[ViewerRecord], kpi: &KpiStats) -> ScalarBlock {
    let distinct_clients = distinct(records, Metric::DistinctClients);
    let distinct_ips = distinct(records, Metric::DistinctIps);

    let watch: Vec<u64> = records.iter().map(|r| r.watch_time_minutes).collect();
    let histogram = &kpi.watch_histogram;

    let average = kpi
        .average_watch_minutes
        .or_else(|| histogram_average(histogram))
        .or_else(|| {
            (!watch.is_empty()).then(|| watch.iter().sum::<u64>() as f64 / watch.len() as f64)
        })
        .unwrap_or(0.0);

    let median = kpi
        .median_watch_minutes
        .or_else(|| histogram_median(histogram).map(|m| m as f64))
        .or_else(|| list_median(&watch).map(|m| m as f64))
        .unwrap_or(0.0);

    let total = kpi
        .total_watch_minutes
        .or_else(|| (!histogram.is_empty()).then(|| histogram_total(histogram)))
        .unwrap_or_else(|| watch.iter().sum::<u64>() as f64);

    ScalarBlock {
        distinct_ips,
        distinct_clients,
        unique_viewers: kpi.total_viewers.unwrap_or(distinct_clients as u64),
        views: kpi.views.unwrap_or(records.len() as u64),
        average_watch: WatchTime::from_minutes(average),
        median_watch: WatchTime::from_minutes(median),
        total_watch: WatchTime::from_minutes(total),
        peak_concurrency: kpi
            .peak_concurrent_viewers
            .or_else(|| peak_concurrency(records)),
    }
}
