//! Canonical event model for Teamwork webhooks.
//!
//! Every supported payload shape (message, message reply, comment, task,
//! document upload) is reduced to a single [`NormalizedEvent`] before it is
//! filtered, stored or answered.

pub mod fields;
pub mod html;
pub mod normalize;
pub mod time;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

pub use html::strip_html;
pub use normalize::{normalize, resolve_upstream, NormalizeError};
pub use time::{parse_timestamp, parse_upstream_timestamp};

/// Which webhook produced the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    MessageCreated,
    MessageReply,
    CommentCreated,
    TaskCreated,
    FileUploaded,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::MessageCreated,
        EventKind::MessageReply,
        EventKind::CommentCreated,
        EventKind::TaskCreated,
        EventKind::FileUploaded,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::MessageCreated => "message_created",
            EventKind::MessageReply => "message_reply",
            EventKind::CommentCreated => "comment_created",
            EventKind::TaskCreated => "task_created",
            EventKind::FileUploaded => "file_uploaded",
        }
    }

    /// Map a Teamwork event name (`X-Projects-Event` header or the `event`
    /// payload field) to a kind. Case, `_` and `-` are ignored.
    pub fn from_teamwork_event(name: &str) -> Option<Self> {
        let folded: String = name
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();

        match folded.as_str() {
            "message.created" => Some(EventKind::MessageCreated),
            "messagereply.created" | "messagepost.created" | "post.created" | "message.replied" => {
                Some(EventKind::MessageReply)
            }
            "comment.created" => Some(EventKind::CommentCreated),
            "task.created" => Some(EventKind::TaskCreated),
            "file.created" | "file.uploaded" => Some(EventKind::FileUploaded),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| anyhow::anyhow!("unknown event kind '{trimmed}'"))
    }
}

/// Where a message lives in Teamwork. Inbox messages behave like email and
/// carry their addressing in the subject line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    #[default]
    Platform,
    Email,
}

impl Category {
    pub fn from_category_name(name: Option<&str>) -> Self {
        match name.map(str::trim) {
            Some(n) if n.eq_ignore_ascii_case("inbox") || n.eq_ignore_ascii_case("email") => {
                Category::Email
            }
            _ => Category::Platform,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Platform => "platform",
            Category::Email => "email",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedEvent {
    pub source_event_id: i64,
    pub event_kind: EventKind,
    pub project_id: Option<i64>,
    pub author_id: Option<i64>,
    pub author_name: Option<String>,
    /// Post or comment id inside the thread.
    pub related_post_id: Option<i64>,
    /// Message, task or object the event belongs to; replies go here.
    pub thread_id: Option<i64>,
    pub object_type: Option<String>,
    pub category: Category,
    pub subject: Option<String>,
    pub body_text: String,
    pub occurred_at: DateTime<Utc>,
    #[serde(skip)]
    pub raw_payload: serde_json::Value,
}

impl NormalizedEvent {
    /// Text the mention check runs against.
    pub fn addressed_text(&self) -> Option<&str> {
        match self.category {
            Category::Email => self.subject.as_deref(),
            Category::Platform => Some(self.body_text.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn teamwork_event_names_map_to_kinds() {
        assert_eq!(
            EventKind::from_teamwork_event("MESSAGE.CREATED"),
            Some(EventKind::MessageCreated)
        );
        assert_eq!(
            EventKind::from_teamwork_event("message_reply.created"),
            Some(EventKind::MessageReply)
        );
        assert_eq!(
            EventKind::from_teamwork_event("post.created"),
            Some(EventKind::MessageReply)
        );
        assert_eq!(
            EventKind::from_teamwork_event("comment.created"),
            Some(EventKind::CommentCreated)
        );
        assert_eq!(EventKind::from_teamwork_event("message.updated"), None);
    }

    #[test]
    fn kind_parses_from_its_label() {
        for kind in EventKind::ALL {
            assert_eq!(kind.as_str().parse::<EventKind>().unwrap(), kind);
        }
        assert!("nope".parse::<EventKind>().is_err());
    }

    #[test]
    fn inbox_category_is_email() {
        assert_eq!(Category::from_category_name(Some("Inbox")), Category::Email);
        assert_eq!(
            Category::from_category_name(Some("General")),
            Category::Platform
        );
        assert_eq!(Category::from_category_name(None), Category::Platform);
    }
}
