//! Responder: acknowledge addressed events in Teamwork and, for message
//! replies, relay the text to the action API and post its answer.
//!
//! Nothing here fails the webhook. Every outbound error is logged, counted and
//! dropped; there is a single attempt per call.

use crate::events::{EventKind, NormalizedEvent};
use crate::observability::Metrics;
use crate::relay::{ActionRelay, ActionRequest, DEFAULT_PROJECT_ID, DEFAULT_PROJECT_NAME};
use crate::teamwork::{ReplyTarget, SourceSystem};
use std::sync::Arc;

/// Posted back to the thread of every addressed event. Also the loop-guard
/// marker, so changing it means old acknowledgements stop being recognised.
pub const DEFAULT_ACK_MESSAGE: &str =
    "Mensaje recibido. Estamos procesando tu solicitud y te responderemos pronto.";

/// Fixed metadata sent with every relayed request.
#[derive(Debug, Clone)]
pub struct RelayProject {
    pub id: i64,
    pub name: String,
}

impl Default for RelayProject {
    fn default() -> Self {
        Self {
            id: DEFAULT_PROJECT_ID,
            name: DEFAULT_PROJECT_NAME.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResponseReport {
    pub acknowledged: bool,
    pub relayed: bool,
}

pub struct Responder {
    source: Arc<dyn SourceSystem>,
    relay: Option<Arc<dyn ActionRelay>>,
    project: RelayProject,
    ack_message: String,
    metrics: Metrics,
}

impl Responder {
    pub fn new(
        source: Arc<dyn SourceSystem>,
        relay: Option<Arc<dyn ActionRelay>>,
        project: RelayProject,
        ack_message: impl Into<String>,
        metrics: Metrics,
    ) -> Self {
        Self {
            source,
            relay,
            project,
            ack_message: ack_message.into(),
            metrics,
        }
    }

    pub fn ack_message(&self) -> &str {
        &self.ack_message
    }

    /// Where an acknowledgement for `event` belongs, if anywhere.
    pub fn reply_target(event: &NormalizedEvent) -> Option<ReplyTarget> {
        match event.event_kind {
            EventKind::MessageCreated | EventKind::MessageReply => {
                event.thread_id.map(ReplyTarget::Message)
            }
            EventKind::TaskCreated => Some(ReplyTarget::TaskComment(event.source_event_id)),
            EventKind::CommentCreated | EventKind::FileUploaded => {
                if event.object_type.as_deref() == Some("task") {
                    event.thread_id.map(ReplyTarget::TaskComment)
                } else {
                    None
                }
            }
        }
    }

    pub async fn respond(&self, event: &NormalizedEvent) -> ResponseReport {
        let mut report = ResponseReport::default();
        let Some(target) = Self::reply_target(event) else {
            tracing::debug!(
                event_kind = %event.event_kind,
                source_event_id = event.source_event_id,
                "no reply target, skipping acknowledgement"
            );
            return report;
        };

        match self.source.post_reply(target, &self.ack_message).await {
            Ok(()) => {
                report.acknowledged = true;
                tracing::info!(
                    event_kind = %event.event_kind,
                    source_event_id = event.source_event_id,
                    ?target,
                    "acknowledgement posted"
                );
            }
            Err(err) => {
                self.metrics.upstream_failure("post_ack");
                tracing::warn!(
                    event_kind = %event.event_kind,
                    source_event_id = event.source_event_id,
                    ?target,
                    "acknowledgement failed: {err:#}"
                );
            }
        }

        if event.event_kind == EventKind::MessageReply {
            if let (Some(relay), ReplyTarget::Message(message_id)) = (self.relay.as_ref(), target) {
                report.relayed = self.relay_answer(relay.as_ref(), event, message_id).await;
            }
        }
        report
    }

    async fn relay_answer(
        &self,
        relay: &dyn ActionRelay,
        event: &NormalizedEvent,
        message_id: i64,
    ) -> bool {
        let request = ActionRequest::ready(
            self.project.id,
            &self.project.name,
            event.author_id,
            event.author_name.as_deref(),
            &event.body_text,
        );
        let answer = match relay.relay(&request).await {
            Ok(Some(answer)) => answer,
            Ok(None) => {
                tracing::info!(
                    source_event_id = event.source_event_id,
                    "action API returned no message"
                );
                return false;
            }
            Err(err) => {
                self.metrics.upstream_failure("relay");
                tracing::warn!(
                    source_event_id = event.source_event_id,
                    relay = relay.name(),
                    "relay failed: {err:#}"
                );
                return false;
            }
        };

        match self.source.post_message_reply(message_id, &answer).await {
            Ok(()) => {
                tracing::info!(
                    source_event_id = event.source_event_id,
                    message_id,
                    "relayed answer posted"
                );
                true
            }
            Err(err) => {
                self.metrics.upstream_failure("post_answer");
                tracing::warn!(
                    source_event_id = event.source_event_id,
                    message_id,
                    "posting relayed answer failed: {err:#}"
                );
                false
            }
        }
    }
}
