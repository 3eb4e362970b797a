pub mod cached;
pub mod json;
pub mod sqlite;
pub mod trait_def;

pub use cached::CachedEventStore;
pub use json::JsonEventStore;
pub use sqlite::SqliteEventStore;
pub use trait_def::{EventStore, StoreError, StoreResult};

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::config::{StoreBackend, StoreConfig};

/// Open the configured backend, wrapped in the read cache, and initialize it
pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn EventStore>> {
    let inner: Arc<dyn EventStore> = match config.backend {
        StoreBackend::Json => {
            info!("Using JSON event store: {}", config.path);
            Arc::new(JsonEventStore::new(&config.path))
        }
        StoreBackend::Sqlite => {
            info!("Using SQLite event store: {}", config.path);
            Arc::new(SqliteEventStore::new(&config.path, 5).await?)
        }
    };

    let store: Arc<dyn EventStore> =
        Arc::new(CachedEventStore::new(inner, config.cache_entries.max(1)));
    store.init().await?;
    Ok(store)
}
