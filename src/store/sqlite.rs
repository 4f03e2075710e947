use super::{EventStore, InsertOutcome, StoredEvent};
use crate::events::{EventKind, NormalizedEvent};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS webhook_events (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    event_kind      TEXT    NOT NULL,
    source_event_id INTEGER NOT NULL,
    project_id      INTEGER,
    author_id       INTEGER,
    author_name     TEXT,
    related_post_id INTEGER,
    thread_id       INTEGER,
    object_type     TEXT,
    category        TEXT    NOT NULL,
    subject         TEXT,
    body_text       TEXT    NOT NULL,
    occurred_at     TEXT    NOT NULL,
    received_at     TEXT    NOT NULL,
    processed       INTEGER NOT NULL DEFAULT 0,
    raw_payload     TEXT,
    UNIQUE (event_kind, source_event_id)
);
CREATE INDEX IF NOT EXISTS idx_webhook_events_received ON webhook_events (received_at);
CREATE INDEX IF NOT EXISTS idx_webhook_events_processed ON webhook_events (processed);
";

const SELECT_COLUMNS: &str = "id, event_kind, source_event_id, project_id, author_id, author_name, \
     related_post_id, thread_id, object_type, category, subject, body_text, occurred_at, \
     received_at, processed";

#[derive(Clone)]
pub struct SqliteEventStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteEventStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create event store directory {}", parent.display())
            })?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open event store {}", path.display()))?;
        conn.busy_timeout(Duration::from_secs(5))
            .context("failed to set SQLite busy timeout")?;
        let mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .context("failed to enable WAL journal")?;
        tracing::debug!(path = %path.display(), journal_mode = %mode, "event store opened");
        Self::bootstrap(conn)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory event store")?;
        Self::bootstrap(conn)
    }

    fn bootstrap(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .context("failed to create event store schema")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a closure against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock();
            op(&guard)
        })
        .await
        .context("event store task panicked")?
    }
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<StoredEvent> {
    Ok(StoredEvent {
        id: row.get(0)?,
        event_kind: row.get(1)?,
        source_event_id: row.get(2)?,
        project_id: row.get(3)?,
        author_id: row.get(4)?,
        author_name: row.get(5)?,
        related_post_id: row.get(6)?,
        thread_id: row.get(7)?,
        object_type: row.get(8)?,
        category: row.get(9)?,
        subject: row.get(10)?,
        body_text: row.get(11)?,
        occurred_at: row.get(12)?,
        received_at: row.get(13)?,
        processed: row.get::<_, i64>(14)? != 0,
        raw_payload: None,
    })
}

#[async_trait]
impl EventStore for SqliteEventStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn insert_if_absent(&self, event: &NormalizedEvent) -> Result<InsertOutcome> {
        let event = event.clone();
        self.with_conn(move |conn| {
            let raw_payload = if event.raw_payload.is_null() {
                None
            } else {
                Some(event.raw_payload.to_string())
            };
            let inserted = conn
                .execute(
                    "INSERT OR IGNORE INTO webhook_events (
                        event_kind, source_event_id, project_id, author_id, author_name,
                        related_post_id, thread_id, object_type, category, subject,
                        body_text, occurred_at, received_at, processed, raw_payload
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, 0, ?14)",
                    params![
                        event.event_kind.as_str(),
                        event.source_event_id,
                        event.project_id,
                        event.author_id,
                        event.author_name,
                        event.related_post_id,
                        event.thread_id,
                        event.object_type,
                        event.category.as_str(),
                        event.subject,
                        event.body_text,
                        event.occurred_at.to_rfc3339_opts(SecondsFormat::Secs, false),
                        Utc::now().to_rfc3339_opts(SecondsFormat::Millis, false),
                        raw_payload,
                    ],
                )
                .with_context(|| {
                    format!(
                        "failed to insert {} event {}",
                        event.event_kind, event.source_event_id
                    )
                })?;
            Ok(if inserted == 0 {
                InsertOutcome::Duplicate
            } else {
                InsertOutcome::Inserted
            })
        })
        .await
    }

    async fn get(&self, kind: EventKind, source_event_id: i64) -> Result<Option<StoredEvent>> {
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {SELECT_COLUMNS}, raw_payload FROM webhook_events
                 WHERE event_kind = ?1 AND source_event_id = ?2"
            );
            let found = conn
                .query_row(&sql, params![kind.as_str(), source_event_id], |row| {
                    let mut event = map_row(row)?;
                    let raw: Option<String> = row.get(15)?;
                    event.raw_payload = raw.and_then(|text| serde_json::from_str(&text).ok());
                    Ok(event)
                })
                .optional()
                .context("failed to read stored event")?;
            Ok(found)
        })
        .await
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<StoredEvent>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {SELECT_COLUMNS} FROM webhook_events ORDER BY id DESC LIMIT ?1"
            );
            let mut stmt = conn.prepare(&sql).context("failed to prepare event listing")?;
            let rows = stmt
                .query_map(params![limit], map_row)
                .context("failed to list stored events")?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .context("failed to decode stored event")
        })
        .await
    }

    async fn count(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM webhook_events", [], |row| row.get(0))
                .context("failed to count stored events")?;
            usize::try_from(count).context("event count out of range")
        })
        .await
    }

    async fn health_check(&self) -> bool {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .context("event store ping failed")
        })
        .await
        .is_ok()
    }
}
