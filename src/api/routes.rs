use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use super::handlers::{event_report, event_summary, health_check, list_events, AppState};

pub fn create_api_router(state: AppState) -> Router {
    let files = ServeDir::new(state.renderer.output_dir());
    let state = Arc::new(state);

    let api_routes = Router::new()
        .route("/events", get(list_events))
        .route("/events/{id}/summary", get(event_summary))
        .with_state(Arc::clone(&state));

    Router::new()
        .route("/health", get(health_check))
        .route("/reports/{id}", get(event_report))
        .with_state(state)
        .nest("/api", api_routes)
        .nest_service("/files", files)
        .layer(CorsLayer::permissive())
}
