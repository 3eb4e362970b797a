use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::models::{EventDocument, EventMeta, StoredEvent};
use crate::storage::{EventStore, StoreError, StoreResult};

/// Event store kept as one JSON document, `{"events": [...]}`.
///
/// The document is loaded on `init` and rewritten in full on every insert,
/// through a temp file and rename so a crash never leaves it half-written.
pub struct JsonEventStore {
    path: PathBuf,
    document: RwLock<EventDocument>,
}

impl JsonEventStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            document: RwLock::new(EventDocument::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write_document(&self, document: &EventDocument) -> StoreResult<()> {
        let bytes = serde_json::to_vec(document)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl EventStore for JsonEventStore {
    async fn init(&self) -> StoreResult<()> {
        let loaded = match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice::<EventDocument>(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No event store at {}, starting empty", self.path.display());
                EventDocument::default()
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        debug!(
            "Loaded {} events from {}",
            loaded.events.len(),
            self.path.display()
        );
        *self.document.write().await = loaded;
        Ok(())
    }

    async fn contains(&self, event_id: &str) -> StoreResult<bool> {
        let document = self.document.read().await;
        Ok(document.events.iter().any(|e| e.event_id == event_id))
    }

    async fn insert(&self, event: StoredEvent) -> StoreResult<()> {
        let mut document = self.document.write().await;
        if document.events.iter().any(|e| e.event_id == event.event_id) {
            return Err(StoreError::Conflict(event.event_id));
        }

        document.events.push(event);
        if let Err(e) = self.write_document(&document).await {
            // keep memory consistent with what is on disk
            document.events.pop();
            return Err(e);
        }
        Ok(())
    }

    async fn get(&self, event_id: &str) -> StoreResult<Option<StoredEvent>> {
        let document = self.document.read().await;
        Ok(document
            .events
            .iter()
            .find(|e| e.event_id == event_id)
            .cloned())
    }

    async fn list(&self) -> StoreResult<Vec<EventMeta>> {
        let document = self.document.read().await;
        Ok(document.events.iter().map(StoredEvent::meta).collect())
    }
}
