//! Acknowledgement senders.
//!
//! An acknowledgement tells the requester their message was received. It is
//! best-effort: adapters log a failed ack and move on, except the chat
//! adapter which reports it to the HTTP caller.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::channels::slack::ChatApi;
use crate::error::ChannelError;
use crate::ticket::TicketDraft;

/// Default body of the email acknowledgement.
pub const DEFAULT_EMAIL_ACK_BODY: &str = "Hello,\n\n\
We have received your message and opened a support ticket. \
A member of our team will get back to you shortly.\n\n\
Support Team";

/// Sends a receipt for a ticket draft back to its originating conversation.
#[async_trait]
pub trait Acknowledger: Send + Sync {
    fn name(&self) -> &str;

    async fn acknowledge(&self, draft: &TicketDraft) -> Result<(), ChannelError>;
}

// ── Slack ───────────────────────────────────────────────────────────

/// Posts a fixed text into the Slack conversation the draft came from.
pub struct SlackAcknowledger {
    api: Arc<dyn ChatApi>,
    text: String,
}

impl SlackAcknowledger {
    pub fn new(api: Arc<dyn ChatApi>, text: impl Into<String>) -> Self {
        Self {
            api,
            text: text.into(),
        }
    }
}

#[async_trait]
impl Acknowledger for SlackAcknowledger {
    fn name(&self) -> &str {
        "slack"
    }

    async fn acknowledge(&self, draft: &TicketDraft) -> Result<(), ChannelError> {
        self.api.post_message(&draft.channel_id, &self.text).await?;
        Ok(())
    }
}

// ── Email ───────────────────────────────────────────────────────────

/// A rendered email acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailAck {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Renders the templated email acknowledgement and emits it to the log.
///
/// Outbound SMTP delivery is not part of this service.
pub struct EmailTemplateAcknowledger {
    body: String,
}

impl EmailTemplateAcknowledger {
    pub fn new(body: impl Into<String>) -> Self {
        Self { body: body.into() }
    }

    /// Build the reply for a draft: `Re: <subject>` to the sender.
    pub fn render(&self, draft: &TicketDraft) -> EmailAck {
        let subject = draft
            .raw_data
            .get("subject")
            .and_then(|s| s.as_str())
            .map(normalize_subject)
            .unwrap_or_default();
        let subject = if subject.is_empty() {
            "Re: Your support request".to_string()
        } else {
            format!("Re: {subject}")
        };

        EmailAck {
            to: draft.user_id.clone(),
            subject,
            body: self.body.clone(),
        }
    }
}

impl Default for EmailTemplateAcknowledger {
    fn default() -> Self {
        Self::new(DEFAULT_EMAIL_ACK_BODY)
    }
}

#[async_trait]
impl Acknowledger for EmailTemplateAcknowledger {
    fn name(&self) -> &str {
        "email-template"
    }

    async fn acknowledge(&self, draft: &TicketDraft) -> Result<(), ChannelError> {
        let ack = self.render(draft);
        if ack.to.trim().is_empty() {
            return Err(ChannelError::SendFailed {
                name: "email".into(),
                reason: "acknowledgement has no recipient".into(),
            });
        }
        info!(
            to = %ack.to,
            subject = %ack.subject,
            external_id = %draft.external_id,
            "Email acknowledgement rendered"
        );
        Ok(())
    }
}

/// Strip reply/forward prefixes (`Re:`, `Fwd:`, `FW:`) repeatedly.
pub fn normalize_subject(subject: &str) -> String {
    let mut rest = subject.trim();
    loop {
        let lower = rest.to_ascii_lowercase();
        let stripped = ["re:", "fwd:", "fw:"]
            .iter()
            .find(|prefix| lower.starts_with(*prefix))
            .map(|prefix| rest[prefix.len()..].trim_start());
        match stripped {
            Some(next) => rest = next,
            None => return rest.trim_end().to_string(),
        }
    }
}
