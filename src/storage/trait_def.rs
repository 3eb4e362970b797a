use crate::models::{EventMeta, StoredEvent};
use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("event {0} is already stored")]
    Conflict(String),
    #[error("event store document is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Initialize the storage (create files/tables, load existing data)
    async fn init(&self) -> StoreResult<()>;

    /// Whether an event with this vendor id is already stored
    async fn contains(&self, event_id: &str) -> StoreResult<bool>;

    /// Persist a newly fetched event. Events are written once and never updated.
    async fn insert(&self, event: StoredEvent) -> StoreResult<()>;

    /// Get a stored event by vendor id
    async fn get(&self, event_id: &str) -> StoreResult<Option<StoredEvent>>;

    /// List stored events in insertion order
    async fn list(&self) -> StoreResult<Vec<EventMeta>>;
}
