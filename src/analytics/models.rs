//! Data models for viewer analytics

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::analytics::scalars::format_duration;

/// Label used for any dimension value that could not be derived.
///
/// No user-agent family or resolution reported by the vendor is called this,
/// so records falling back to it never merge into a real group.
pub const UNKNOWN_FAMILY: &str = "Other";

/// Label for records whose export carries no resolution at all
pub const UNKNOWN_RESOLUTION: &str = "Unknown";

/// One attendance entry of an event, normalized from the vendor export
#[derive(Debug, Clone, PartialEq)]
pub struct ViewerRecord {
    /// Vendor client identity (stable per player instance)
    pub client_id: String,

    /// Viewer IP address as reported by the vendor
    pub ip_address: String,

    /// City name, absent when the vendor had no geo data
    pub city: Option<String>,

    /// Region/state, absent when the vendor had no geo data
    pub region: Option<String>,

    /// Screen resolution, e.g. "1920x1080"
    pub resolution: String,

    /// Raw user-agent string
    pub user_agent: String,

    /// Minutes watched
    pub watch_time_minutes: u64,

    /// When the vendor last saw this viewer (naive UTC)
    pub timestamp: Option<NaiveDateTime>,
}

impl ViewerRecord {
    /// Instant the viewer started watching, derived from the last-seen
    /// timestamp minus the watched minutes.
    pub fn started_at(&self) -> Option<NaiveDateTime> {
        let minutes = i64::try_from(self.watch_time_minutes).ok()?;
        let watched = chrono::TimeDelta::try_minutes(minutes)?;
        self.timestamp?.checked_sub_signed(watched)
    }
}

/// Dimension keys derived for a single record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimensionKeys {
    /// `"{city}, {region}"`, absent when either part is missing
    pub city: Option<String>,
    pub resolution: String,
    pub os: String,
    pub browser: String,
}

/// Which identity a group is deduplicated by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    DistinctClients,
    DistinctIps,
}

impl Metric {
    pub fn identity<'r>(&self, record: &'r ViewerRecord) -> &'r str {
        match self {
            Metric::DistinctClients => &record.client_id,
            Metric::DistinctIps => &record.ip_address,
        }
    }
}

/// Ordered `(label, count)` pairs ready for charting
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedSeries {
    pub entries: Vec<(String, usize)>,
}

impl RankedSeries {
    pub fn new(entries: Vec<(String, usize)>) -> Self {
        Self { entries }
    }

    pub fn labels(&self) -> Vec<String> {
        self.entries.iter().map(|(label, _)| label.clone()).collect()
    }

    pub fn counts(&self) -> Vec<u64> {
        self.entries.iter().map(|(_, count)| *count as u64).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First `n` entries
    pub fn top(&self, n: usize) -> &[(String, usize)] {
        &self.entries[..n.min(self.entries.len())]
    }
}

/// A watch-time figure in minutes together with its report rendering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchTime {
    pub minutes: f64,
    pub display: String,
}

impl WatchTime {
    pub fn from_minutes(minutes: f64) -> Self {
        Self {
            minutes,
            display: format_duration(minutes),
        }
    }
}

impl Default for WatchTime {
    fn default() -> Self {
        Self::from_minutes(0.0)
    }
}

/// Event-level scalar statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScalarBlock {
    /// Distinct IP addresses across all records
    pub distinct_ips: usize,

    /// Distinct client identities across all records
    pub distinct_clients: usize,

    /// Vendor-reported unique viewers, or distinct clients when not reported
    pub unique_viewers: u64,

    /// Vendor-reported views, or the number of records when not reported
    pub views: u64,

    pub average_watch: WatchTime,

    /// Median watch time. Derived from a 5-minute-bucket histogram when
    /// that is all the vendor supplies, so it is an approximation there.
    pub median_watch: WatchTime,

    pub total_watch: WatchTime,

    pub peak_concurrency: Option<u64>,
}

/// Chart kinds understood by the report template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Bar,
    Histogram,
}

/// Values along a chart axis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChartAxis {
    Labels(Vec<String>),
    Values(Vec<u64>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chart {
    pub chart_type: ChartType,
    pub x: ChartAxis,
    pub y: Vec<u64>,
    pub title: String,
}

impl Chart {
    fn bar(series: &RankedSeries, title: &str) -> Self {
        Self {
            chart_type: ChartType::Bar,
            x: ChartAxis::Labels(series.labels()),
            y: series.counts(),
            title: title.to_string(),
        }
    }
}

/// Shape handed to the report renderer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportPayload {
    pub charts: Vec<Chart>,
    pub distinct_ips: usize,
    pub distinct_clients: usize,
}

/// Aggregated view of one event's audience
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventSummary {
    pub city_by_client: RankedSeries,
    pub city_by_ip: RankedSeries,
    pub resolution_by_client: RankedSeries,
    pub os_by_client: RankedSeries,
    pub browser_by_client: RankedSeries,
    pub scalars: ScalarBlock,

    /// Per-record watch minutes in input order, for the histogram
    pub watch_times: Vec<u64>,
}

impl EventSummary {
    /// Charts in report order
    pub fn charts(&self) -> Vec<Chart> {
        vec![
            Chart::bar(&self.city_by_client, "Unique Clients Per City"),
            Chart::bar(&self.city_by_ip, "Unique IPs Per City"),
            Chart::bar(&self.resolution_by_client, "Unique Clients Per Resolution"),
            Chart::bar(&self.os_by_client, "Unique Clients Per OS"),
            Chart::bar(&self.browser_by_client, "Unique Clients Per Browser"),
            Chart {
                chart_type: ChartType::Histogram,
                x: ChartAxis::Values(self.watch_times.clone()),
                y: Vec::new(),
                title: "Watch Times (mins)".to_string(),
            },
        ]
    }

    pub fn report_payload(&self) -> ReportPayload {
        ReportPayload {
            charts: self.charts(),
            distinct_ips: self.scalars.distinct_ips,
            distinct_clients: self.scalars.distinct_clients,
        }
    }

    /// Top cities by distinct clients, for the notification body
    pub fn top_cities(&self, n: usize) -> &[(String, usize)] {
        self.city_by_client.top(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_started_at_subtracts_watch_time() {
        let record = ViewerRecord {
            client_id: "c1".to_string(),
            ip_address: "10.0.0.1".to_string(),
            city: None,
            region: None,
            resolution: "1920x1080".to_string(),
            user_agent: String::new(),
            watch_time_minutes: 90,
            timestamp: NaiveDate::from_ymd_opt(2024, 3, 1)
                .and_then(|d| d.and_hms_opt(12, 0, 0)),
        };

        let started = record.started_at().unwrap();
        assert_eq!(started.format("%H:%M:%S").to_string(), "10:30:00");
    }

    #[test]
    fn test_chart_order_and_histogram_shape() {
        let summary = EventSummary {
            city_by_client: RankedSeries::new(vec![("Austin, TX".to_string(), 2)]),
            watch_times: vec![5, 10],
            ..Default::default()
        };

        let charts = summary.charts();
        assert_eq!(charts.len(), 6);
        assert_eq!(charts[0].title, "Unique Clients Per City");
        assert_eq!(charts[0].x, ChartAxis::Labels(vec!["Austin, TX".to_string()]));
        assert_eq!(charts[0].y, vec![2]);
        assert_eq!(charts[5].chart_type, ChartType::Histogram);
        assert_eq!(charts[5].x, ChartAxis::Values(vec![5, 10]));
        assert!(charts[5].y.is_empty());
    }

    #[test]
    fn test_chart_type_serializes_lowercase() {
        let json = serde_json::to_string(&ChartType::Histogram).unwrap();
        assert_eq!(json, "\"histogram\"");
    }

    #[test]
    fn test_top_is_bounded() {
        let series = RankedSeries::new(vec![("a".to_string(), 3), ("b".to_string(), 1)]);
        assert_eq!(series.top(5).len(), 2);
        assert_eq!(series.top(1), &[("a".to_string(), 3)]);
    }
}
