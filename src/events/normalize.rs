//! Payload Normalizer: webhook JSON → [`NormalizedEvent`].
//!
//! [`normalize`] is pure and handles everything that can be read from the
//! payload itself. [`resolve_upstream`] then fills the gaps that need a
//! Teamwork lookup (the parent message of a reply, metadata of a bare
//! attachment). Lookup failures are logged and leave the fields empty.

use super::fields::{as_int, field, int_field, object, str_field};
use super::{parse_timestamp, strip_html, Category, EventKind, NormalizedEvent};
use crate::observability::Metrics;
use crate::teamwork::SourceSystem;
use serde_json::Value;

const PROJECT_ID: &[&str] = &["projectId", "project-id", "project_id"];
const BODY: &[&str] = &["body", "raw-body", "rawBody", "htmlBody", "html-body"];
const DATE_CREATED: &[&str] = &["dateCreated", "date-created", "createdAt", "datetime"];
const USER_ID: &[&str] = &["userId", "user-id", "author-id", "authorId"];

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum NormalizeError {
    /// The payload does not carry the object this event kind is keyed by.
    #[error("payload has no '{expected}' object")]
    UnknownPayload { expected: &'static str },
    /// The object is there but an identifying field is missing.
    #[error("missing field {0}")]
    MissingField(&'static str),
}

/// Build a [`NormalizedEvent`] from a raw webhook payload.
pub fn normalize(kind: EventKind, payload: &Value) -> Result<NormalizedEvent, NormalizeError> {
    let mut event = match kind {
        EventKind::MessageCreated => normalize_message(payload)?,
        EventKind::MessageReply => normalize_reply(payload)?,
        EventKind::CommentCreated => normalize_comment(payload)?,
        EventKind::TaskCreated => normalize_task(payload)?,
        EventKind::FileUploaded => normalize_file(payload)?,
    };

    // The event creator is the acting user; object-level user ids are the fallback.
    if let Some(creator) = object(payload, &["eventCreator", "event-creator", "user"]) {
        if let Some(id) = int_field(creator, &["id"]) {
            event.author_id = Some(id);
        }
        event.author_name = author_name(creator);
    }
    event.raw_payload = payload.clone();
    Ok(event)
}

/// Fill fields that require a Teamwork lookup. Never fails.
pub async fn resolve_upstream(
    event: &mut NormalizedEvent,
    source: &dyn SourceSystem,
    metrics: &Metrics,
) {
    match event.event_kind {
        EventKind::MessageReply => {
            let Some(message_id) = event.thread_id else {
                return;
            };
            match source.fetch_message(message_id).await {
                Ok(ctx) => {
                    if ctx.project_id.is_some() {
                        event.project_id = ctx.project_id;
                    }
                    event.category = Category::from_category_name(ctx.category_name.as_deref());
                    if event.subject.is_none() {
                        event.subject = ctx.subject.map(|s| strip_html(&s));
                    }
                }
                Err(err) => {
                    metrics.upstream_failure("fetch_message");
                    tracing::warn!(
                        message_id,
                        source_event_id = event.source_event_id,
                        "parent message lookup failed, keeping reply without project: {err:#}"
                    );
                }
            }
        }
        EventKind::FileUploaded if event.body_text.trim().is_empty() => {
            match source.fetch_file(event.source_event_id).await {
                Ok(ctx) => {
                    event.body_text = file_text(ctx.name.as_deref(), ctx.description.as_deref());
                    if event.project_id.is_none() {
                        event.project_id = ctx.project_id;
                    }
                }
                Err(err) => {
                    metrics.upstream_failure("fetch_file");
                    tracing::warn!(
                        file_id = event.source_event_id,
                        "attachment metadata lookup failed: {err:#}"
                    );
                }
            }
        }
        _ => {}
    }
}

fn blank(kind: EventKind, source_event_id: i64, occurred: Option<&str>) -> NormalizedEvent {
    NormalizedEvent {
        source_event_id,
        event_kind: kind,
        project_id: None,
        author_id: None,
        author_name: None,
        related_post_id: None,
        thread_id: None,
        object_type: None,
        category: Category::Platform,
        subject: None,
        body_text: String::new(),
        occurred_at: parse_timestamp(occurred),
        raw_payload: Value::Null,
    }
}

fn root<'a>(payload: &'a Value, keys: &[&str], expected: &'static str) -> Result<&'a Value, NormalizeError> {
    object(payload, keys).ok_or(NormalizeError::UnknownPayload { expected })
}

fn body_text(obj: &Value) -> String {
    str_field(obj, BODY)
        .map(|html| strip_html(&html))
        .unwrap_or_default()
}

fn author_name(creator: &Value) -> Option<String> {
    let first = str_field(creator, &["firstName", "first-name"]).unwrap_or_default();
    let last = str_field(creator, &["lastName", "last-name"]).unwrap_or_default();
    let full = format!("{} {}", first.trim(), last.trim());
    let full = full.trim();
    (!full.is_empty()).then(|| full.to_string())
}

fn normalize_message(payload: &Value) -> Result<NormalizedEvent, NormalizeError> {
    let message = root(payload, &["message"], "message")?;
    let id = int_field(message, &["id"]).ok_or(NormalizeError::MissingField("message.id"))?;
    let post = object(message, &["post", "latestPost"]);
    let date = post
        .and_then(|p| str_field(p, DATE_CREATED))
        .or_else(|| str_field(message, DATE_CREATED));

    let mut event = blank(EventKind::MessageCreated, id, date.as_deref());
    event.thread_id = Some(id);
    event.project_id = int_field(message, PROJECT_ID);
    event.category = Category::from_category_name(
        str_field(message, &["categoryName", "category-name"]).as_deref(),
    );
    event.subject = str_field(message, &["title", "subject"]).map(|s| strip_html(&s));
    event.body_text = post
        .map(body_text)
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| body_text(message));
    event.related_post_id = post.and_then(|p| int_field(p, &["id"]));
    event.author_id = post
        .and_then(|p| int_field(p, USER_ID))
        .or_else(|| int_field(message, USER_ID));
    Ok(event)
}

fn normalize_reply(payload: &Value) -> Result<NormalizedEvent, NormalizeError> {
    let post = root(payload, &["messagePost", "messagepost", "post"], "messagePost")?;
    let id = int_field(post, &["id"]).ok_or(NormalizeError::MissingField("messagePost.id"))?;
    let date = str_field(post, DATE_CREATED);

    let mut event = blank(EventKind::MessageReply, id, date.as_deref());
    event.related_post_id = Some(id);
    event.thread_id = int_field(post, &["messageId", "message-id", "postId"]);
    event.project_id = int_field(post, PROJECT_ID);
    event.author_id = int_field(post, USER_ID);
    event.body_text = body_text(post);
    Ok(event)
}

fn normalize_comment(payload: &Value) -> Result<NormalizedEvent, NormalizeError> {
    let comment = root(payload, &["comment"], "comment")?;
    let id = int_field(comment, &["id"]).ok_or(NormalizeError::MissingField("comment.id"))?;
    let date = str_field(comment, DATE_CREATED);

    let mut event = blank(EventKind::CommentCreated, id, date.as_deref());
    event.related_post_id = Some(id);
    event.thread_id = int_field(comment, &["objectId", "object-id"]);
    event.object_type = str_field(comment, &["objectType", "object-type"])
        .map(|t| t.trim().to_ascii_lowercase());
    event.project_id = int_field(comment, PROJECT_ID);
    event.author_id = int_field(comment, USER_ID);
    event.body_text = body_text(comment);
    Ok(event)
}

fn normalize_task(payload: &Value) -> Result<NormalizedEvent, NormalizeError> {
    let task = root(payload, &["task", "todo-item"], "task")?;
    let id = int_field(task, &["id"]).ok_or(NormalizeError::MissingField("task.id"))?;
    let date = str_field(task, DATE_CREATED);

    let mut event = blank(EventKind::TaskCreated, id, date.as_deref());
    event.thread_id = Some(id);
    event.object_type = Some("task".into());
    event.project_id = int_field(task, PROJECT_ID)
        .or_else(|| object(payload, &["project"]).and_then(|p| int_field(p, &["id"])));
    event.author_id = int_field(task, &["createdBy", "created-by", "creatorId"]);

    let name = str_field(task, &["name", "content"]).map(|n| strip_html(&n));
    let description = str_field(task, &["description"]).map(|d| strip_html(&d));
    event.body_text = match (name, description) {
        (Some(name), Some(desc)) => format!("{name}\n{desc}"),
        (Some(only), None) | (None, Some(only)) => only,
        (None, None) => String::new(),
    };
    Ok(event)
}

fn normalize_file(payload: &Value) -> Result<NormalizedEvent, NormalizeError> {
    if let Some(file) = object(payload, &["file"]) {
        let id = int_field(file, &["id"]).ok_or(NormalizeError::MissingField("file.id"))?;
        let date = str_field(file, DATE_CREATED);

        let mut event = blank(EventKind::FileUploaded, id, date.as_deref());
        event.project_id = int_field(file, PROJECT_ID);
        event.author_id = int_field(file, &["uploadedBy", "uploaded-by"]);
        event.body_text = file_text(
            str_field(file, &["originalName", "name"]).as_deref(),
            str_field(file, &["description"]).as_deref(),
        );
        if let Some(task_id) = int_field(file, &["taskId", "task-id"]) {
            event.thread_id = Some(task_id);
            event.object_type = Some("task".into());
        }
        return Ok(event);
    }

    let task = root(payload, &["task"], "file")?;
    let task_id = int_field(task, &["id"]).ok_or(NormalizeError::MissingField("task.id"))?;
    let attachment = field(task, &["attachments"])
        .and_then(Value::as_array)
        .and_then(|items| items.first())
        .ok_or(NormalizeError::MissingField("task.attachments"))?;
    // Attachments arrive either as bare ids or as objects.
    let file_id = match attachment {
        Value::Object(_) => int_field(attachment, &["id"]),
        bare => as_int(bare),
    }
    .ok_or(NormalizeError::MissingField("task.attachments.id"))?;

    let date = str_field(attachment, DATE_CREATED).or_else(|| str_field(task, DATE_CREATED));
    let mut event = blank(EventKind::FileUploaded, file_id, date.as_deref());
    event.thread_id = Some(task_id);
    event.object_type = Some("task".into());
    event.project_id = int_field(task, PROJECT_ID);
    event.body_text = file_text(
        str_field(attachment, &["originalName", "name"]).as_deref(),
        str_field(attachment, &["description"]).as_deref(),
    );
    Ok(event)
}

fn file_text(name: Option<&str>, description: Option<&str>) -> String {
    let parts: Vec<String> = [name, description]
        .into_iter()
        .flatten()
        .map(strip_html)
        .filter(|part| !part.trim().is_empty())
        .collect();
    parts.join("\n")
}
