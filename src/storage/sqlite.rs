use crate::models::{EventMeta, RawViewer, StoredEvent};
use crate::storage::{EventStore, StoreError, StoreResult};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

pub struct SqliteEventStore {
    pool: Arc<SqlitePool>,
}

#[derive(FromRow)]
struct EventRow {
    event_id: String,
    start_time: String,
    name: String,
    public_info: String,
    viewer_info: String,
}

#[derive(FromRow)]
struct MetaRow {
    event_id: String,
    start_time: String,
    name: String,
    viewer_records: i64,
}

impl SqliteEventStore {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid SQLite URL {}", database_url))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

impl TryFrom<EventRow> for StoredEvent {
    type Error = StoreError;

    fn try_from(row: EventRow) -> StoreResult<Self> {
        let viewer_info: Vec<RawViewer> = serde_json::from_str(&row.viewer_info)?;
        Ok(StoredEvent {
            event_id: row.event_id,
            start_time: row.start_time,
            name: row.name,
            public_info: serde_json::from_str(&row.public_info)?,
            viewer_info,
        })
    }
}

fn db_error(e: sqlx::Error) -> StoreError {
    StoreError::Other(e.into())
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn init(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_id TEXT NOT NULL UNIQUE,
                start_time TEXT NOT NULL,
                name TEXT NOT NULL,
                public_info TEXT NOT NULL,
                viewer_info TEXT NOT NULL,
                viewer_records INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await
        .map_err(db_error)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_event_id ON events(event_id)")
            .execute(self.pool.as_ref())
            .await
            .map_err(db_error)?;

        Ok(())
    }

    async fn contains(&self, event_id: &str) -> StoreResult<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM events WHERE event_id = ?")
            .bind(event_id)
            .fetch_optional(self.pool.as_ref())
            .await
            .map_err(db_error)?;
        Ok(found.is_some())
    }

    async fn insert(&self, event: StoredEvent) -> StoreResult<()> {
        let public_info = serde_json::to_string(&event.public_info)?;
        let viewer_info = serde_json::to_string(&event.viewer_info)?;
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO events (event_id, start_time, name, public_info, viewer_info, viewer_records, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.event_id)
        .bind(&event.start_time)
        .bind(&event.name)
        .bind(public_info)
        .bind(viewer_info)
        .bind(event.viewer_info.len() as i64)
        .bind(now)
        .execute(self.pool.as_ref())
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(StoreError::Conflict(event.event_id))
            }
            Err(e) => Err(db_error(e)),
        }
    }

    async fn get(&self, event_id: &str) -> StoreResult<Option<StoredEvent>> {
        let row = sqlx::query_as::<_, EventRow>(
            "SELECT event_id, start_time, name, public_info, viewer_info FROM events WHERE event_id = ?",
        )
        .bind(event_id)
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(db_error)?;

        row.map(StoredEvent::try_from).transpose()
    }

    async fn list(&self) -> StoreResult<Vec<EventMeta>> {
        let rows = sqlx::query_as::<_, MetaRow>(
            "SELECT event_id, start_time, name, viewer_records FROM events ORDER BY id ASC",
        )
        .fetch_all(self.pool.as_ref())
        .await
        .map_err(db_error)?;

        Ok(rows
            .into_iter()
            .map(|row| EventMeta {
                event_id: row.event_id,
                start_time: row.start_time,
                name: row.name,
                viewer_records: row.viewer_records.max(0) as usize,
            })
            .collect())
    }
}
