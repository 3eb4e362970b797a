//! Integration tests for event aggregation
//!
//! These run stored events through the full normalization, grouping, ranking
//! and scalar pipeline, the same way the sync service and the API do.

use marquee::analytics::{
    ChartAxis, ChartType, EventAggregator, NotifyDecision, NotifyGate, WatchTimeUnit,
};
use marquee::models::StoredEvent;
use serde_json::{json, Value};

const IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Mobile/15E148 Safari/604.1";
const ANDROID: &str = "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Mobile Safari/537.36";
const FIREFOX: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0";

fn event(name: &str, public_info: Value, viewers: Value) -> StoredEvent {
    serde_json::from_value(json!({
        "event_id": "evt-1",
        "start_time": "2024-03-31T09:00:00",
        "name": name,
        "public_info": public_info,
        "viewer_info": viewers,
    }))
    .unwrap()
}

fn aggregator(unit: WatchTimeUnit) -> EventAggregator {
    EventAggregator::with_builtin_rules(unit).unwrap()
}

#[test]
fn test_city_ranking_with_missing_location() {
    let event = event(
        "Easter Sunday",
        Value::Null,
        json!([
            {"clientId": "a", "ipAddress": "10.0.0.1", "city": "Austin", "state": "TX", "resolution": "1920x1080", "userAgent": IPHONE},
            {"clientId": "b", "ipAddress": "10.0.0.1", "city": "Austin", "state": "TX", "resolution": "1920x1080", "userAgent": ANDROID},
            {"clientId": "c", "ipAddress": "10.0.0.2", "city": "Denver", "state": "CO", "resolution": "1280x720", "userAgent": FIREFOX},
            {"clientId": "d", "ipAddress": "10.0.0.2", "resolution": "1280x720"}
        ]),
    );

    let summary = aggregator(WatchTimeUnit::Seconds).summarize_event(&event);

    assert_eq!(
        summary.city_by_client.entries,
        vec![("Austin, TX".to_string(), 2), ("Denver, CO".to_string(), 1)]
    );
    assert_eq!(summary.scalars.distinct_ips, 2);
    assert_eq!(summary.scalars.distinct_clients, 4);
    // No KPI payload: unique viewers and views come from the export
    assert_eq!(summary.scalars.unique_viewers, 4);
    assert_eq!(summary.scalars.views, 4);

    assert_eq!(
        summary.os_by_client.entries,
        vec![
            ("iOS".to_string(), 1),
            ("Android".to_string(), 1),
            ("Windows".to_string(), 1),
            ("Other".to_string(), 1),
        ]
    );
}

#[test]
fn test_kpi_payload_takes_precedence() {
    let event = event(
        "Easter Sunday",
        json!({
            "totalViewers": 120,
            "views": "150",
            "averageWatchTime": 1500,
            "totalWatchTime": 80820,
            "peakConcurrentViewers": 64,
            "watchTimeHistogram": {"30": 1, "10": 3}
        }),
        json!([
            {"clientId": "a", "ipAddress": "10.0.0.1", "watchTimeMinutes": 90}
        ]),
    );

    let scalars = aggregator(WatchTimeUnit::Seconds).summarize_event(&event).scalars;

    assert_eq!(scalars.unique_viewers, 120);
    assert_eq!(scalars.views, 150);
    assert_eq!(scalars.average_watch.display, "25m");
    assert_eq!(scalars.total_watch.display, "22h 27m");
    // No KPI median: falls back to the histogram
    assert_eq!(scalars.median_watch.display, "10m");
    assert_eq!(scalars.peak_concurrency, Some(64));
}

#[test]
fn test_minutes_unit_is_not_rescaled() {
    let event = event(
        "Midweek",
        json!({"averageWatchTime": 45, "totalWatchTime": 90}),
        json!([]),
    );

    let scalars = aggregator(WatchTimeUnit::Minutes).summarize_event(&event).scalars;
    assert_eq!(scalars.average_watch.display, "45m");
    assert_eq!(scalars.total_watch.display, "1h 30m");
}

#[test]
fn test_histogram_fallback_when_kpi_missing_watch_fields() {
    let event = event(
        "Midweek",
        json!({"watchTimeHistogram": {"10": 3, "30": 1, "bogus": 7}}),
        json!([]),
    );

    let scalars = aggregator(WatchTimeUnit::Seconds).summarize_event(&event).scalars;
    assert_eq!(scalars.average_watch.display, "15m");
    assert_eq!(scalars.median_watch.display, "10m");
    assert_eq!(scalars.total_watch.display, "1h 0m");
}

#[test]
fn test_oversized_histogram_counts_do_not_abort_aggregation() {
    let event = event(
        "Midweek",
        json!({"watchTimeHistogram": {"5": u64::MAX, "10": 1}}),
        json!([]),
    );

    let scalars = aggregator(WatchTimeUnit::Seconds).summarize_event(&event).scalars;
    assert_eq!(scalars.median_watch.display, "5m");
    assert_eq!(scalars.average_watch.display, "5m");
}

#[test]
fn test_peak_concurrency_from_viewer_timestamps() {
    let event = event(
        "Midweek",
        Value::Null,
        json!([
            {"clientId": "a", "timestamp": "2024-03-31T10:00:00", "watchTimeMinutes": 60},
            {"clientId": "b", "timestamp": "2024-03-31T10:30:00", "watchTimeMinutes": 40},
            {"clientId": "c", "timestamp": "2024-03-31T11:00:00", "watchTimeMinutes": 30}
        ]),
    );

    let scalars = aggregator(WatchTimeUnit::Seconds).summarize_event(&event).scalars;
    // a: 9:00-10:00, b: 9:50-10:30, c: 10:30-11:00
    assert_eq!(scalars.peak_concurrency, Some(2));
}

#[test]
fn test_charts_follow_ranked_series() {
    let event = event(
        "Easter Sunday",
        Value::Null,
        json!([
            {"clientId": "a", "city": "Reno", "state": "NV", "resolution": "1280x720", "watchTimeMinutes": 5},
            {"clientId": "b", "city": "Austin", "state": "TX", "resolution": "1920x1080", "watchTimeMinutes": 50},
            {"clientId": "c", "city": "Austin", "state": "TX", "resolution": "1920x1080", "watchTimeMinutes": 20}
        ]),
    );

    let payload = aggregator(WatchTimeUnit::Seconds)
        .summarize_event(&event)
        .report_payload();

    assert_eq!(payload.charts.len(), 6);
    let city = &payload.charts[0];
    assert_eq!(city.chart_type, ChartType::Bar);
    assert_eq!(
        city.x,
        ChartAxis::Labels(vec!["Austin, TX".to_string(), "Reno, NV".to_string()])
    );
    assert_eq!(city.y, vec![2, 1]);

    let watch = &payload.charts[5];
    assert_eq!(watch.chart_type, ChartType::Histogram);
    assert_eq!(watch.x, ChartAxis::Values(vec![5, 50, 20]));
    assert!(watch.y.is_empty());
}

#[test]
fn test_gate_decisions_for_stored_events() {
    let gate = NotifyGate::new(5, Some("a@example.org".to_string()), Some("b@example.org".to_string()))
        .with_excluded_patterns(vec!["Social Media".to_string()]);
    let aggregator = aggregator(WatchTimeUnit::Seconds);

    let busy = event("Easter Sunday", json!({"totalViewers": 6}), json!([]));
    assert_eq!(aggregator.evaluate(&busy, &gate).decision, NotifyDecision::Notify);

    let exactly_floor = event("Easter Sunday", json!({"totalViewers": 5}), json!([]));
    assert_eq!(
        aggregator.evaluate(&exactly_floor, &gate).decision,
        NotifyDecision::BelowThreshold {
            unique_viewers: 5,
            floor: 5
        }
    );

    let social = event("Social Media Clips", json!({"totalViewers": 600}), json!([]));
    assert!(matches!(
        aggregator.evaluate(&social, &gate).decision,
        NotifyDecision::Excluded { .. }
    ));
}
