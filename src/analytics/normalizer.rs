//! Viewer record normalization
//!
//! Turns vendor payload shapes into [`ViewerRecord`]s and [`KpiStats`], and
//! derives the per-record dimension keys used for grouping. Nothing here
//! fails: malformed input degrades to the documented defaults.

use chrono::{DateTime, NaiveDateTime};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::analytics::models::{DimensionKeys, ViewerRecord, UNKNOWN_RESOLUTION};
use crate::analytics::user_agent::UserAgentClassifier;
use crate::models::RawViewer;

/// Unit the vendor KPI payload reports watch-time scalars in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchTimeUnit {
    #[default]
    Seconds,
    Minutes,
}

impl WatchTimeUnit {
    /// Convert a vendor value into minutes
    pub fn to_minutes(self, value: f64) -> f64 {
        match self {
            WatchTimeUnit::Seconds => value / 60.0,
            WatchTimeUnit::Minutes => value,
        }
    }
}

/// Scalar statistics and histogram pulled from the vendor KPI payload.
/// Watch-time values are already converted to minutes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KpiStats {
    pub total_viewers: Option<u64>,
    pub views: Option<u64>,
    pub average_watch_minutes: Option<f64>,
    pub median_watch_minutes: Option<f64>,
    pub total_watch_minutes: Option<f64>,
    pub peak_concurrent_viewers: Option<u64>,

    /// `(bucket minute, viewer count)` in ascending bucket order
    pub watch_histogram: Vec<(u64, u64)>,
}

impl KpiStats {
    /// Read the KPI payload. Missing or non-numeric fields stay `None`.
    pub fn from_payload(payload: &Value, unit: WatchTimeUnit) -> Self {
        let Some(object) = payload.as_object() else {
            if !payload.is_null() {
                warn!("KPI payload is not a JSON object, ignoring it");
            }
            return Self::default();
        };

        let watch = |name: &str| number_field(object, name).map(|v| unit.to_minutes(v.max(0.0)));

        Self {
            total_viewers: count_field(object, "totalViewers"),
            views: count_field(object, "views"),
            average_watch_minutes: watch("averageWatchTime"),
            median_watch_minutes: watch("medianWatchTime"),
            total_watch_minutes: watch("totalWatchTime"),
            peak_concurrent_viewers: count_field(object, "peakConcurrentViewers"),
            watch_histogram: object
                .get("watchTimeHistogram")
                .map(parse_histogram)
                .unwrap_or_default(),
        }
    }
}

fn number_field(object: &Map<String, Value>, name: &str) -> Option<f64> {
    match object.get(name)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn count_field(object: &Map<String, Value>, name: &str) -> Option<u64> {
    number_field(object, name).map(|v| v.max(0.0) as u64)
}

fn parse_histogram(value: &Value) -> Vec<(u64, u64)> {
    let Some(buckets) = value.as_object() else {
        warn!("watchTimeHistogram is not an object, ignoring it");
        return Vec::new();
    };

    let mut histogram: Vec<(u64, u64)> = buckets
        .iter()
        .filter_map(|(bucket, count)| {
            let Ok(minute) = bucket.trim().parse::<u64>() else {
                warn!("Skipping watch-time histogram bucket '{}'", bucket);
                return None;
            };
            let count = count.as_u64().or_else(|| count.as_f64().map(|c| c.max(0.0) as u64))?;
            Some((minute, count))
        })
        .collect();

    histogram.sort_by_key(|(minute, _)| *minute);
    histogram
}

/// Normalize one viewer export entry
pub fn normalize_viewer(raw: &RawViewer) -> ViewerRecord {
    let watch_time_minutes = raw
        .watch_time_minutes
        .as_ref()
        .and_then(|n| n.as_u64().or_else(|| n.as_f64().map(|v| v.max(0.0) as u64)))
        .unwrap_or(0);

    let timestamp = raw.timestamp.as_deref().and_then(|ts| {
        let parsed = parse_timestamp(ts);
        if parsed.is_none() {
            debug!("Unparsable viewer timestamp '{}'", ts);
        }
        parsed
    });

    ViewerRecord {
        client_id: raw.client_id.clone().unwrap_or_default(),
        ip_address: raw.ip_address.clone().unwrap_or_default(),
        city: non_blank(raw.city.as_deref()),
        region: non_blank(raw.state.as_deref()),
        resolution: non_blank(raw.resolution.as_deref())
            .unwrap_or_else(|| UNKNOWN_RESOLUTION.to_string()),
        user_agent: raw.user_agent.clone().unwrap_or_default(),
        watch_time_minutes,
        timestamp,
    }
}

pub fn normalize_viewers(raw: &[RawViewer]) -> Vec<ViewerRecord> {
    raw.iter().map(normalize_viewer).collect()
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Parse RFC 3339 or a naive ISO-8601 timestamp (taken as UTC)
pub fn parse_timestamp(ts: &str) -> Option<NaiveDateTime> {
    let ts = ts.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(ts) {
        return Some(dt.naive_utc());
    }
    NaiveDateTime::parse_from_str(ts, "%Y-%m-%dT%H:%M:%S%.f").ok()
}

/// Derive all dimension keys of a record
pub fn derive_keys(record: &ViewerRecord, classifier: &dyn UserAgentClassifier) -> DimensionKeys {
    let families = classifier.classify(&record.user_agent);

    DimensionKeys {
        city: city_key(record),
        resolution: record.resolution.clone(),
        os: families.os_family,
        browser: families.browser_family,
    }
}

/// `"{city}, {region}"` when both are present
pub fn city_key(record: &ViewerRecord) -> Option<String> {
    match (&record.city, &record.region) {
        (Some(city), Some(region)) => Some(format!("{}, {}", city, region)),
        _ => None,
    }
}
