//! Read-only HTTP surface over stored events and their reports

pub mod handlers;
pub mod routes;

pub use handlers::AppState;
pub use routes::create_api_router;
