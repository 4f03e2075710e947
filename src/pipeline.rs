//! Normalizer → Mention Filter → Persister → Responder, for any [`EventKind`].

use crate::events::{normalize, resolve_upstream, EventKind, NormalizeError, NormalizedEvent};
use crate::mention::{MentionFilter, Verdict};
use crate::observability::Metrics;
use crate::responder::{Responder, ResponseReport};
use crate::store::{EventStore, InsertOutcome};
use crate::teamwork::SourceSystem;
use serde_json::{json, Value};
use std::sync::Arc;

pub const REASON_NOT_ADDRESSED: &str = "mensaje no dirigido al profesor forta";
pub const REASON_OWN_REPLY: &str = "respuesta automatica";
pub const REASON_UNRECOGNISED: &str = "payload no reconocido";
pub const REASON_NOT_MESSAGE_EVENT: &str = "not a message event";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persisted {
    Inserted,
    Duplicate,
    /// Storage error, already logged and counted.
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    Accepted {
        kind: EventKind,
        source_event_id: i64,
        persisted: Persisted,
        report: ResponseReport,
    },
    Ignored {
        kind: Option<EventKind>,
        reason: &'static str,
    },
    Rejected {
        kind: EventKind,
        error: NormalizeError,
    },
}

impl PipelineOutcome {
    pub fn is_rejected(&self) -> bool {
        matches!(self, PipelineOutcome::Rejected { .. })
    }

    /// JSON answer for the webhook sender.
    pub fn body(&self) -> Value {
        match self {
            PipelineOutcome::Accepted { kind, .. } => {
                let (status, reason) = saved_reply(*kind);
                json!({"status": status, "reason": reason})
            }
            PipelineOutcome::Ignored { reason, .. } => {
                json!({"status": "ignored", "reason": reason})
            }
            PipelineOutcome::Rejected { error, .. } => {
                json!({"status": "error", "reason": error.to_string()})
            }
        }
    }
}

fn saved_reply(kind: EventKind) -> (&'static str, &'static str) {
    match kind {
        EventKind::MessageCreated => ("saved", "mensaje guardado"),
        EventKind::MessageReply => ("ok", "respuesta guardada"),
        EventKind::CommentCreated => ("saved", "comentario guardado"),
        EventKind::TaskCreated => ("saved", "tarea guardada"),
        EventKind::FileUploaded => ("saved", "archivo guardado"),
    }
}

pub struct Pipeline {
    store: Arc<dyn EventStore>,
    source: Arc<dyn SourceSystem>,
    mention: MentionFilter,
    responder: Responder,
    metrics: Metrics,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn EventStore>,
        source: Arc<dyn SourceSystem>,
        mention: MentionFilter,
        responder: Responder,
        metrics: Metrics,
    ) -> Self {
        Self {
            store,
            source,
            mention,
            responder,
            metrics,
        }
    }

    /// Route a delivery from the generic endpoint. The kind comes from the
    /// `X-Projects-Event` header when present, else from the payload's `event`.
    pub async fn process_named(&self, header_event: Option<&str>, payload: &Value) -> PipelineOutcome {
        let name = header_event
            .map(str::to_string)
            .or_else(|| payload.get("event").and_then(Value::as_str).map(str::to_string));
        match name.as_deref().and_then(EventKind::from_teamwork_event) {
            Some(kind) => self.process(kind, payload).await,
            None => {
                self.metrics.webhook_received("unknown");
                self.metrics.ignored("unknown", "not_message_event");
                tracing::info!(webhook_event = name.as_deref().unwrap_or(""), "ignoring unrouted webhook");
                PipelineOutcome::Ignored {
                    kind: None,
                    reason: REASON_NOT_MESSAGE_EVENT,
                }
            }
        }
    }

    pub async fn process(&self, kind: EventKind, payload: &Value) -> PipelineOutcome {
        self.metrics.webhook_received(kind.as_str());

        let mut event = match normalize(kind, payload) {
            Ok(event) => event,
            Err(NormalizeError::UnknownPayload { expected }) => {
                self.metrics.ignored(kind.as_str(), "unrecognised");
                tracing::info!(event_kind = %kind, expected, "payload shape not recognised");
                return PipelineOutcome::Ignored {
                    kind: Some(kind),
                    reason: REASON_UNRECOGNISED,
                };
            }
            Err(error) => {
                self.metrics.ignored(kind.as_str(), "invalid");
                tracing::warn!(event_kind = %kind, "rejecting webhook: {error}");
                return PipelineOutcome::Rejected { kind, error };
            }
        };

        resolve_upstream(&mut event, self.source.as_ref(), &self.metrics).await;

        match self.mention.evaluate(&event) {
            Verdict::Addressed => {}
            Verdict::NotAddressed => {
                self.metrics.ignored(kind.as_str(), "not_addressed");
                tracing::debug!(
                    event_kind = %kind,
                    source_event_id = event.source_event_id,
                    "event not addressed, ignoring"
                );
                return PipelineOutcome::Ignored {
                    kind: Some(kind),
                    reason: REASON_NOT_ADDRESSED,
                };
            }
            Verdict::OwnReply => {
                self.metrics.ignored(kind.as_str(), "own_reply");
                tracing::debug!(
                    event_kind = %kind,
                    source_event_id = event.source_event_id,
                    "own acknowledgement echoed back, ignoring"
                );
                return PipelineOutcome::Ignored {
                    kind: Some(kind),
                    reason: REASON_OWN_REPLY,
                };
            }
        }

        let persisted = self.persist(&event).await;
        let report = if persisted == Persisted::Duplicate {
            ResponseReport::default()
        } else {
            self.responder.respond(&event).await
        };

        PipelineOutcome::Accepted {
            kind,
            source_event_id: event.source_event_id,
            persisted,
            report,
        }
    }

    async fn persist(&self, event: &NormalizedEvent) -> Persisted {
        let kind = event.event_kind.as_str();
        match self.store.insert_if_absent(event).await {
            Ok(InsertOutcome::Inserted) => {
                self.metrics.saved(kind);
                tracing::info!(
                    event_kind = kind,
                    source_event_id = event.source_event_id,
                    project_id = ?event.project_id,
                    "event saved"
                );
                Persisted::Inserted
            }
            Ok(InsertOutcome::Duplicate) => {
                self.metrics.duplicate(kind);
                tracing::info!(
                    event_kind = kind,
                    source_event_id = event.source_event_id,
                    "duplicate delivery, already stored"
                );
                Persisted::Duplicate
            }
            Err(err) => {
                self.metrics.persistence_failure(kind);
                tracing::error!(
                    event_kind = kind,
                    source_event_id = event.source_event_id,
                    store = self.store.name(),
                    "failed to persist event: {err:#}"
                );
                Persisted::Failed
            }
        }
    }
}
