//! Idempotent Persister.
//!
//! Events are written once per natural key `(event_kind, source_event_id)`.
//! A redelivered webhook hits the unique constraint and is reported as
//! [`InsertOutcome::Duplicate`]; the existing row is never touched.

pub mod sqlite;

use crate::events::{EventKind, NormalizedEvent};
use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

pub use sqlite::SqliteEventStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Duplicate,
}

/// A persisted event as read back from storage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredEvent {
    pub id: i64,
    pub event_kind: String,
    pub source_event_id: i64,
    pub project_id: Option<i64>,
    pub author_id: Option<i64>,
    pub author_name: Option<String>,
    pub related_post_id: Option<i64>,
    pub thread_id: Option<i64>,
    pub object_type: Option<String>,
    pub category: String,
    pub subject: Option<String>,
    pub body_text: String,
    pub occurred_at: String,
    pub received_at: String,
    pub processed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_payload: Option<serde_json::Value>,
}

#[async_trait]
pub trait EventStore: Send + Sync {
    fn name(&self) -> &str;

    async fn insert_if_absent(&self, event: &NormalizedEvent) -> Result<InsertOutcome>;

    async fn get(&self, kind: EventKind, source_event_id: i64) -> Result<Option<StoredEvent>>;

    /// Newest first, without raw payloads.
    async fn list_recent(&self, limit: usize) -> Result<Vec<StoredEvent>>;

    async fn count(&self) -> Result<usize>;

    async fn health_check(&self) -> bool;
}
