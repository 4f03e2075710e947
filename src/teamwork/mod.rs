//! Teamwork REST API as seen by the relay: thread lookups and replies.

pub mod client;

use anyhow::Result;
use async_trait::async_trait;

pub use client::TeamworkClient;

/// Parent message details needed to normalize a reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageContext {
    pub project_id: Option<i64>,
    pub category_name: Option<String>,
    pub subject: Option<String>,
}

/// File metadata for uploads that only carry an attachment id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileContext {
    pub name: Option<String>,
    pub description: Option<String>,
    pub project_id: Option<i64>,
}

/// Where a reply is posted. Messages and task comments use different
/// Teamwork endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyTarget {
    Message(i64),
    TaskComment(i64),
}

#[async_trait]
pub trait SourceSystem: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_message(&self, message_id: i64) -> Result<MessageContext>;

    async fn fetch_file(&self, file_id: i64) -> Result<FileContext>;

    async fn post_message_reply(&self, message_id: i64, body: &str) -> Result<()>;

    async fn post_task_comment(&self, task_id: i64, body: &str) -> Result<()>;

    async fn post_reply(&self, target: ReplyTarget, body: &str) -> Result<()> {
        match target {
            ReplyTarget::Message(id) => self.post_message_reply(id, body).await,
            ReplyTarget::TaskComment(id) => self.post_task_comment(id, body).await,
        }
    }
}
