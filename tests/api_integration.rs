//! Integration tests for the report server routes

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use marquee::analytics::{EventAggregator, WatchTimeUnit};
use marquee::api::{create_api_router, AppState};
use marquee::models::StoredEvent;
use marquee::report::ReportRenderer;
use marquee::storage::{EventStore, SqliteEventStore};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const TEMPLATE: &str = "<title>{{name}}</title><b>{{unique_viewers}}</b><script>{{charts_json}}</script>";

async fn create_test_store() -> Arc<dyn EventStore> {
    let store = SqliteEventStore::new("sqlite::memory:", 1).await.unwrap();
    store.init().await.unwrap();

    let event: StoredEvent = serde_json::from_value(json!({
        "event_id": "evt-1",
        "start_time": "2024-03-31T09:00:00",
        "name": "Easter <Sunday>",
        "public_info": {"totalViewers": 42, "views": 57, "averageWatchTime": 1800},
        "viewer_info": [
            {"clientId": "a", "ipAddress": "10.0.0.1", "city": "Austin", "state": "TX", "resolution": "1920x1080"},
            {"clientId": "b", "ipAddress": "10.0.0.1", "city": "Austin", "state": "TX", "resolution": "1920x1080"},
            {"clientId": "c", "ipAddress": "10.0.0.2", "city": "Denver", "state": "CO", "resolution": "1280x720"}
        ]
    }))
    .unwrap();
    store.insert(event).await.unwrap();

    Arc::new(store)
}

async fn create_test_app(output_dir: &std::path::Path) -> Router {
    create_api_router(AppState {
        store: create_test_store().await,
        aggregator: Arc::new(EventAggregator::with_builtin_rules(WatchTimeUnit::Seconds).unwrap()),
        renderer: ReportRenderer::new(TEMPLATE.to_string(), output_dir.to_path_buf()),
        top_cities: 1,
    })
}

async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

#[tokio::test]
async fn test_health() {
    let dir = tempfile::tempdir().unwrap();
    let (status, body) = get(create_test_app(dir.path()).await, "/health").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["message"], "OK");
}

#[tokio::test]
async fn test_list_events() {
    let dir = tempfile::tempdir().unwrap();
    let (status, body) = get(create_test_app(dir.path()).await, "/api/events").await;
    assert_eq!(status, StatusCode::OK);

    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json.as_array().unwrap().len(), 1);
    assert_eq!(json[0]["event_id"], "evt-1");
    assert_eq!(json[0]["viewer_records"], 3);
}

#[tokio::test]
async fn test_event_summary() {
    let dir = tempfile::tempdir().unwrap();
    let (status, body) = get(create_test_app(dir.path()).await, "/api/events/evt-1/summary").await;
    assert_eq!(status, StatusCode::OK);

    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["event"]["name"], "Easter <Sunday>");
    assert_eq!(json["scalars"]["unique_viewers"], 42);
    assert_eq!(json["scalars"]["views"], 57);
    assert_eq!(json["scalars"]["distinct_ips"], 2);
    assert_eq!(json["scalars"]["average_watch"]["display"], "30m");
    assert_eq!(json["top_cities"], json!([{"city": "Austin, TX", "clients": 2}]));

    let charts = json["report"]["charts"].as_array().unwrap();
    assert_eq!(charts.len(), 6);
    assert_eq!(charts[0]["title"], "Unique Clients Per City");
    assert_eq!(charts[0]["x"], json!(["Austin, TX", "Denver, CO"]));
    assert_eq!(charts[0]["y"], json!([2, 1]));
}

#[tokio::test]
async fn test_unknown_event_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_test_app(dir.path()).await;

    let (status, body) = get(app.clone(), "/api/events/nope/summary").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"], "Event nope not found");

    let (status, _) = get(app, "/reports/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_report_rendered_on_demand() {
    let dir = tempfile::tempdir().unwrap();
    let response = create_test_app(dir.path())
        .await
        .oneshot(Request::builder().uri("/reports/evt-1").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/html"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let html = String::from_utf8(body.to_vec()).unwrap();
    assert!(html.starts_with("<title>Easter &lt;Sunday&gt;</title><b>42</b>"));
    assert!(html.contains("Unique Clients Per Browser"));
}

#[tokio::test]
async fn test_written_reports_are_served() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("report.html"), "<p>stored</p>").unwrap();

    let (status, body) = get(create_test_app(dir.path()).await, "/files/report.html").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"<p>stored</p>");

    let (status, _) = get(create_test_app(dir.path()).await, "/files/missing.html").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
