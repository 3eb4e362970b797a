pub mod analytics;
pub mod api;
pub mod config;
pub mod models;
pub mod notify;
pub mod report;
pub mod storage;
pub mod sync;
pub mod vendor;
