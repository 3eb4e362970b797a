use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Html,
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

use crate::analytics::{EventAggregator, EventSummary, ReportPayload, ScalarBlock};
use crate::models::{EventMeta, StoredEvent};
use crate::report::{ReportHeader, ReportRenderer};
use crate::storage::EventStore;

pub struct AppState {
    pub store: Arc<dyn EventStore>,
    pub aggregator: Arc<EventAggregator>,
    pub renderer: ReportRenderer,
    pub top_cities: usize,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize)]
pub struct SuccessResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct CityCount {
    pub city: String,
    pub clients: usize,
}

/// Everything the report shows, as JSON
#[derive(Serialize)]
pub struct SummaryResponse {
    pub event: EventMeta,
    pub scalars: ScalarBlock,
    pub top_cities: Vec<CityCount>,
    pub report: ReportPayload,
}

impl SummaryResponse {
    pub fn new(event: &StoredEvent, summary: &EventSummary, top_cities: usize) -> Self {
        Self {
            event: event.meta(),
            scalars: summary.scalars.clone(),
            top_cities: summary
                .top_cities(top_cities)
                .iter()
                .map(|(city, clients)| CityCount {
                    city: city.clone(),
                    clients: *clients,
                })
                .collect(),
            report: summary.report_payload(),
        }
    }
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn not_found(event_id: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: format!("Event {} not found", event_id),
        }),
    )
}

fn internal(context: &str, e: impl std::fmt::Display) -> ApiError {
    error!("{}: {}", context, e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: format!("{}: {}", context, e),
        }),
    )
}

async fn load_event(state: &AppState, event_id: &str) -> Result<StoredEvent, ApiError> {
    match state.store.get(event_id).await {
        Ok(Some(event)) => Ok(event),
        Ok(None) => Err(not_found(event_id)),
        Err(e) => Err(internal("Failed to load event", e)),
    }
}

/// List stored events
pub async fn list_events(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<EventMeta>>, ApiError> {
    state
        .store
        .list()
        .await
        .map(Json)
        .map_err(|e| internal("Failed to list events", e))
}

/// Aggregated summary of one event
pub async fn event_summary(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<String>,
) -> Result<Json<SummaryResponse>, ApiError> {
    let event = load_event(&state, &event_id).await?;
    let summary = state.aggregator.summarize_event(&event);

    Ok(Json(SummaryResponse::new(&event, &summary, state.top_cities)))
}

/// Render the HTML report of one event on demand
pub async fn event_report(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<String>,
) -> Result<Html<String>, ApiError> {
    let event = load_event(&state, &event_id).await?;
    let summary = state.aggregator.summarize_event(&event);

    state
        .renderer
        .render(ReportHeader::from(&event), &summary)
        .map(Html)
        .map_err(|e| internal("Failed to render report", e))
}

/// Health check endpoint
pub async fn health_check() -> Json<SuccessResponse> {
    Json(SuccessResponse {
        message: "OK".to_string(),
    })
}
