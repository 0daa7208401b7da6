//! Channel events and the canonical ticket draft built from them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{IntakeError, ValidationError};

/// External surface a support request arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Slack,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Slack => "slack",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One inbound message as a channel adapter saw it.
///
/// Immutable once built. The normalizer consumes it by value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawChannelEvent {
    pub channel: Channel,
    /// Channel-native id (Message-ID, Slack event id). Used for dedup.
    pub external_id: String,
    /// Conversation the reply belongs in (Slack channel, email address).
    pub conversation_id: String,
    /// Channel-native user id.
    pub sender_id: String,
    /// Extracted plain-text content.
    pub body: String,
    /// Original payload, kept for audit/debug.
    pub raw_payload: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

/// Canonical, channel-agnostic ticket handed to the classification queue.
///
/// Serialized form is the queue's wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketDraft {
    pub channel: Channel,
    pub channel_id: String,
    pub user_id: String,
    pub message: String,
    pub raw_data: serde_json::Value,
    /// Stable identity of the originating event; retries publish the same value.
    pub external_id: String,
    pub received_at: DateTime<Utc>,
}

/// Why an event did not become a ticket without anything going wrong.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// Required fields absent; not every event is a support request.
    NotASupportRequest { missing: Vec<&'static str> },
    /// External id already handled inside the dedup window.
    Duplicate { external_id: String },
    /// Posted by a bot, most likely our own acknowledgement.
    OwnMessage,
    /// Dropped by an intake filter rule.
    Filtered { reason: String },
    /// Fields present but rejected by the normalizer.
    Invalid(ValidationError),
}

impl SkipReason {
    /// Short label for logging and HTTP responses.
    pub fn label(&self) -> &'static str {
        match self {
            Self::NotASupportRequest { .. } => "not_a_support_request",
            Self::Duplicate { .. } => "duplicate",
            Self::OwnMessage => "own_message",
            Self::Filtered { .. } => "filtered",
            Self::Invalid(_) => "invalid",
        }
    }
}

/// Result of handing one channel event to the intake.
#[derive(Debug)]
pub enum TicketOutcome {
    Created(TicketDraft),
    Skipped(SkipReason),
    Failed(IntakeError),
}

impl TicketOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Created(_) => "created",
            Self::Skipped(_) => "skipped",
            Self::Failed(_) => "failed",
        }
    }

    pub fn draft(&self) -> Option<&TicketDraft> {
        match self {
            Self::Created(draft) => Some(draft),
            _ => None,
        }
    }
}
