//! Mention Filter: is this event addressed to the monitored recipient?

use crate::events::NormalizedEvent;

/// Trigger variants matched by default.
pub const DEFAULT_TRIGGERS: &[&str] = &[
    "@profesorf",
    "@profesor forta",
    "@profesorforta",
    "profesor forta",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Addressed,
    NotAddressed,
    /// Our own acknowledgement (or a post by the relay's Teamwork user)
    /// coming back through the webhook.
    OwnReply,
}

#[derive(Debug, Clone)]
pub struct MentionFilter {
    triggers: Vec<String>,
    ack_marker: String,
    bot_user_id: Option<i64>,
}

impl Default for MentionFilter {
    fn default() -> Self {
        Self::new(DEFAULT_TRIGGERS, crate::responder::DEFAULT_ACK_MESSAGE, None)
    }
}

impl MentionFilter {
    pub fn new<I, S>(triggers: I, ack_message: &str, bot_user_id: Option<i64>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let triggers = triggers
            .into_iter()
            .map(|t| t.as_ref().trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        Self {
            triggers,
            ack_marker: ack_message.trim().to_lowercase(),
            bot_user_id,
        }
    }

    /// Case-insensitive substring match against any trigger. No word
    /// boundaries: "x@profesorfy" matches too.
    pub fn is_target(&self, text: Option<&str>) -> bool {
        let Some(text) = text.filter(|t| !t.trim().is_empty()) else {
            return false;
        };
        let folded = text.to_lowercase();
        self.triggers.iter().any(|trigger| folded.contains(trigger.as_str()))
    }

    pub fn is_own_reply(&self, event: &NormalizedEvent) -> bool {
        if self.bot_user_id.is_some() && event.author_id == self.bot_user_id {
            return true;
        }
        !self.ack_marker.is_empty() && event.body_text.to_lowercase().contains(&self.ack_marker)
    }

    pub fn evaluate(&self, event: &NormalizedEvent) -> Verdict {
        if self.is_own_reply(event) {
            return Verdict::OwnReply;
        }
        if self.is_target(event.addressed_text()) {
            Verdict::Addressed
        } else {
            Verdict::NotAddressed
        }
    }
}
