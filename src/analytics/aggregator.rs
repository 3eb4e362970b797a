//! Per-event viewer aggregation
//!
//! Builds an [`EventSummary`] from one event's viewer records in a single
//! synchronous pass. There is no shared mutable state, so independent events
//! can be summarized from any thread.

use std::sync::Arc;

use tracing::debug;

use crate::analytics::gate::{NotifyDecision, NotifyGate};
use crate::analytics::grouping::{group, summarize, GroupedBucket};
use crate::analytics::models::{DimensionKeys, EventSummary, Metric, ViewerRecord};
use crate::analytics::normalizer::{derive_keys, normalize_viewers, KpiStats, WatchTimeUnit};
use crate::analytics::ranker::rank;
use crate::analytics::scalars::derive_scalars;
use crate::analytics::user_agent::{RuleTableClassifier, UserAgentClassifier};
use crate::models::StoredEvent;

pub struct EventAggregator {
    classifier: Arc<dyn UserAgentClassifier>,
    watch_time_unit: WatchTimeUnit,
}

impl EventAggregator {
    pub fn new(classifier: Arc<dyn UserAgentClassifier>, watch_time_unit: WatchTimeUnit) -> Self {
        Self {
            classifier,
            watch_time_unit,
        }
    }

    /// Aggregator backed by the built-in user-agent rule table
    pub fn with_builtin_rules(watch_time_unit: WatchTimeUnit) -> Result<Self, regex::Error> {
        Ok(Self::new(
            Arc::new(RuleTableClassifier::builtin()?),
            watch_time_unit,
        ))
    }

    pub fn watch_time_unit(&self) -> WatchTimeUnit {
        self.watch_time_unit
    }

    /// Summarize a stored event from its raw vendor payloads
    pub fn summarize_event(&self, event: &StoredEvent) -> EventSummary {
        let records = normalize_viewers(&event.viewer_info);
        let kpi = KpiStats::from_payload(&event.public_info, self.watch_time_unit);
        self.summarize(&records, &kpi)
    }

    /// Summarize already-normalized records
    pub fn summarize(&self, records: &[ViewerRecord], kpi: &KpiStats) -> EventSummary {
        // Classify each user agent once and reuse the keys for every dimension.
        let keys: Vec<DimensionKeys> = records
            .iter()
            .map(|record| derive_keys(record, self.classifier.as_ref()))
            .collect();

        let by_city = group_by_key(records, &keys, |k| k.city.clone());
        let by_resolution = group_by_key(records, &keys, |k| Some(k.resolution.clone()));
        let by_os = group_by_key(records, &keys, |k| Some(k.os.clone()));
        let by_browser = group_by_key(records, &keys, |k| Some(k.browser.clone()));

        let skipped_city = records.len() - by_city.record_count();
        if skipped_city > 0 {
            debug!(
                "{} of {} viewer records have no city/region, left out of the city breakdown",
                skipped_city,
                records.len()
            );
        }

        EventSummary {
            city_by_client: rank(summarize(&by_city, Metric::DistinctClients)),
            city_by_ip: rank(summarize(&by_city, Metric::DistinctIps)),
            resolution_by_client: rank(summarize(&by_resolution, Metric::DistinctClients)),
            os_by_client: rank(summarize(&by_os, Metric::DistinctClients)),
            browser_by_client: rank(summarize(&by_browser, Metric::DistinctClients)),
            scalars: derive_scalars(records, kpi),
            watch_times: records.iter().map(|r| r.watch_time_minutes).collect(),
        }
    }
}

/// Group through [`group`] using keys derived up front. `group` visits each
/// record once in order, so walking `keys` alongside it pairs them up.
fn group_by_key<'a>(
    records: &'a [ViewerRecord],
    keys: &[DimensionKeys],
    pick: impl Fn(&DimensionKeys) -> Option<String>,
) -> GroupedBucket<'a> {
    let mut keys = keys.iter();
    group(records, |_| keys.next().and_then(&pick))
}

/// Summary plus gate verdict for one event
#[derive(Debug, Clone)]
pub struct EventOutcome {
    pub summary: EventSummary,
    pub decision: NotifyDecision,
}

impl EventAggregator {
    pub fn evaluate(&self, event: &StoredEvent, gate: &NotifyGate) -> EventOutcome {
        let summary = self.summarize_event(event);
        let decision = gate.evaluate(&event.name, &summary);
        EventOutcome { summary, decision }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::normalizer::normalize_viewer;
    use crate::models::RawViewer;
    use serde_json::json;

    const CHROME: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    const SAFARI: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15";

    fn aggregator() -> EventAggregator {
        EventAggregator::with_builtin_rules(WatchTimeUnit::Seconds).unwrap()
    }

    fn viewer(value: serde_json::Value) -> ViewerRecord {
        let raw: RawViewer = serde_json::from_value(value).unwrap();
        normalize_viewer(&raw)
    }

    #[test]
    fn test_city_breakdown_and_totals() {
        let records = vec![
            viewer(json!({"clientId": "c1", "ipAddress": "1.1.1.1", "city": "Austin", "state": "TX", "resolution": "1920x1080", "userAgent": CHROME})),
            viewer(json!({"clientId": "c2", "ipAddress": "1.1.1.1", "city": "Austin", "state": "TX", "resolution": "1920x1080", "userAgent": SAFARI})),
            viewer(json!({"clientId": "c3", "ipAddress": "2.2.2.2", "city": "Denver", "state": "CO", "resolution": "1280x720", "userAgent": CHROME})),
            viewer(json!({"clientId": "c4", "ipAddress": "2.2.2.2", "resolution": "1280x720", "userAgent": "???"})),
        ];

        let summary = aggregator().summarize(&records, &KpiStats::default());

        assert_eq!(
            summary.city_by_client.entries,
            vec![("Austin, TX".to_string(), 2), ("Denver, CO".to_string(), 1)]
        );
        assert_eq!(
            summary.city_by_ip.entries,
            vec![("Austin, TX".to_string(), 1), ("Denver, CO".to_string(), 1)]
        );
        assert_eq!(summary.scalars.distinct_ips, 2);
        assert_eq!(summary.scalars.distinct_clients, 4);
        assert_eq!(
            summary.os_by_client.entries,
            vec![
                ("Windows".to_string(), 2),
                ("Mac OS X".to_string(), 1),
                ("Other".to_string(), 1)
            ]
        );
        assert_eq!(
            summary.browser_by_client.entries,
            vec![
                ("Chrome".to_string(), 2),
                ("Safari".to_string(), 1),
                ("Other".to_string(), 1)
            ]
        );
    }

    #[test]
    fn test_repeat_attendance_counts_once_per_group() {
        let records = vec![
            viewer(json!({"clientId": "c1", "ipAddress": "1.1.1.1", "resolution": "1920x1080", "watchTimeMinutes": 10})),
            viewer(json!({"clientId": "c1", "ipAddress": "1.1.1.1", "resolution": "1920x1080", "watchTimeMinutes": 25})),
            viewer(json!({"clientId": "c1", "ipAddress": "1.1.1.1", "resolution": "1280x720", "watchTimeMinutes": 5})),
        ];

        let summary = aggregator().summarize(&records, &KpiStats::default());
        assert_eq!(
            summary.resolution_by_client.entries,
            vec![("1920x1080".to_string(), 1), ("1280x720".to_string(), 1)]
        );
        assert_eq!(summary.scalars.distinct_clients, 1);
        assert_eq!(summary.watch_times, vec![10, 25, 5]);
    }

    #[test]
    fn test_every_dimension_accounts_for_its_records() {
        let records = vec![
            viewer(json!({"clientId": "a", "city": "Austin", "state": "TX", "resolution": "r1"})),
            viewer(json!({"clientId": "b", "resolution": "r2"})),
            viewer(json!({"clientId": "c", "city": "Reno", "resolution": "r1"})),
        ];
        let summary = aggregator().summarize(&records, &KpiStats::default());

        // every record has a distinct client, so counts equal record counts
        let total = |s: &crate::analytics::models::RankedSeries| -> usize {
            s.entries.iter().map(|(_, c)| c).sum()
        };
        assert_eq!(total(&summary.city_by_client), 1);
        assert_eq!(total(&summary.resolution_by_client), 3);
        assert_eq!(total(&summary.os_by_client), 3);
        assert_eq!(total(&summary.browser_by_client), 3);
    }

    struct CountingClassifier {
        inner: RuleTableClassifier,
        calls: std::sync::atomic::AtomicUsize,
    }

    impl UserAgentClassifier for CountingClassifier {
        fn classify(&self, user_agent: &str) -> crate::analytics::user_agent::AgentFamilies {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            self.inner.classify(user_agent)
        }
    }

    #[test]
    fn test_dimensions_match_direct_grouping() {
        let records = vec![
            viewer(json!({"clientId": "a", "ipAddress": "1", "city": "Reno", "state": "NV", "resolution": "r1", "userAgent": SAFARI})),
            viewer(json!({"clientId": "b", "ipAddress": "2", "resolution": "r2", "userAgent": CHROME})),
            viewer(json!({"clientId": "c", "ipAddress": "2", "city": "Austin", "state": "TX", "resolution": "r1", "userAgent": CHROME})),
            viewer(json!({"clientId": "d", "ipAddress": "3", "city": "Austin", "state": "TX", "resolution": "r3"})),
        ];

        let classifier = Arc::new(CountingClassifier {
            inner: RuleTableClassifier::builtin().unwrap(),
            calls: Default::default(),
        });
        let aggregator = EventAggregator::new(classifier.clone(), WatchTimeUnit::Seconds);
        let summary = aggregator.summarize(&records, &KpiStats::default());

        // user agents are classified once per record, not once per dimension
        assert_eq!(classifier.calls.load(std::sync::atomic::Ordering::Relaxed), records.len());

        let builtin = RuleTableClassifier::builtin().unwrap();
        let keyed = |f: fn(DimensionKeys) -> Option<String>| {
            group(&records, |r| f(derive_keys(r, &builtin)))
        };
        assert_eq!(
            summary.city_by_client,
            rank(summarize(&keyed(|k| k.city), Metric::DistinctClients))
        );
        assert_eq!(
            summary.city_by_ip,
            rank(summarize(&keyed(|k| k.city), Metric::DistinctIps))
        );
        assert_eq!(
            summary.resolution_by_client,
            rank(summarize(&keyed(|k| Some(k.resolution)), Metric::DistinctClients))
        );
        assert_eq!(
            summary.os_by_client,
            rank(summarize(&keyed(|k| Some(k.os)), Metric::DistinctClients))
        );
        assert_eq!(
            summary.browser_by_client,
            rank(summarize(&keyed(|k| Some(k.browser)), Metric::DistinctClients))
        );
    }

    #[test]
    fn test_empty_event() {
        let event = StoredEvent {
            event_id: "e1".to_string(),
            start_time: "2024-03-01T18:00:00".to_string(),
            name: "Empty".to_string(),
            public_info: serde_json::Value::Null,
            viewer_info: Vec::new(),
        };

        let summary = aggregator().summarize_event(&event);
        assert!(summary.city_by_client.is_empty());
        assert!(summary.city_by_ip.is_empty());
        assert!(summary.resolution_by_client.is_empty());
        assert!(summary.os_by_client.is_empty());
        assert!(summary.browser_by_client.is_empty());
        assert!(summary.watch_times.is_empty());
        assert_eq!(summary.scalars.distinct_ips, 0);
        assert_eq!(summary.scalars.total_watch.display, "0m");
    }

    #[test]
    fn test_evaluate_uses_kpi_unique_viewers() {
        let event = StoredEvent {
            event_id: "e2".to_string(),
            start_time: "2024-03-01T18:00:00".to_string(),
            name: "Sunday Service".to_string(),
            public_info: json!({"totalViewers": 6, "views": 9}),
            viewer_info: Vec::new(),
        };
        let gate = NotifyGate::new(
            5,
            Some("from@example.org".to_string()),
            Some("to@example.org".to_string()),
        );

        let outcome = aggregator().evaluate(&event, &gate);
        assert!(outcome.decision.should_notify());
        assert_eq!(outcome.summary.scalars.views, 9);
    }
}
