use crate::models::{EventMeta, StoredEvent};
use crate::storage::{EventStore, StoreResult};
use async_trait::async_trait;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

/// Read-through cache in front of another event store.
///
/// Stored events are immutable once inserted, so cached entries never go
/// stale; the TTL only bounds memory held by rarely viewed events.
pub struct CachedEventStore {
    /// Underlying storage implementation
    inner: Arc<dyn EventStore>,
    /// Read cache for event lookups (Moka cache)
    read_cache: Cache<String, Arc<StoredEvent>>,
}

impl CachedEventStore {
    pub fn new(inner: Arc<dyn EventStore>, max_cache_entries: u64) -> Self {
        let read_cache = Cache::builder()
            .max_capacity(max_cache_entries)
            .time_to_idle(Duration::from_secs(1800))
            .build();

        Self { inner, read_cache }
    }

    /// Number of cached events (approximate, for diagnostics)
    pub fn cached_entries(&self) -> u64 {
        self.read_cache.entry_count()
    }
}

#[async_trait]
impl EventStore for CachedEventStore {
    async fn init(&self) -> StoreResult<()> {
        self.inner.init().await
    }

    async fn contains(&self, event_id: &str) -> StoreResult<bool> {
        if self.read_cache.contains_key(event_id) {
            return Ok(true);
        }
        self.inner.contains(event_id).await
    }

    async fn insert(&self, event: StoredEvent) -> StoreResult<()> {
        let event_id = event.event_id.clone();
        let cached = Arc::new(event.clone());
        self.inner.insert(event).await?;
        self.read_cache.insert(event_id, cached).await;
        Ok(())
    }

    async fn get(&self, event_id: &str) -> StoreResult<Option<StoredEvent>> {
        if let Some(event) = self.read_cache.get(event_id).await {
            return Ok(Some(event.as_ref().clone()));
        }

        // Misses are not cached: the event may be inserted by the next sync.
        let event = self.inner.get(event_id).await?;
        if let Some(ref event) = event {
            self.read_cache
                .insert(event_id.to_string(), Arc::new(event.clone()))
                .await;
        }
        Ok(event)
    }

    async fn list(&self) -> StoreResult<Vec<EventMeta>> {
        self.inner.list().await
    }
}
