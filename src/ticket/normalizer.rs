//! Pure `RawChannelEvent → TicketDraft` conversion.
//!
//! No I/O. Fields are copied verbatim; an event that would produce an
//! empty `message`, `channel_id` or `user_id` is rejected, never patched up.

use crate::error::ValidationError;
use crate::ticket::model::{RawChannelEvent, TicketDraft};

/// Convert one event into a ticket draft.
pub fn normalize(event: RawChannelEvent) -> Result<TicketDraft, ValidationError> {
    require("message", &event.body)?;
    require("channel_id", &event.conversation_id)?;
    require("user_id", &event.sender_id)?;

    Ok(TicketDraft {
        channel: event.channel,
        channel_id: event.conversation_id,
        user_id: event.sender_id,
        message: event.body,
        raw_data: event.raw_payload,
        external_id: event.external_id,
        received_at: event.received_at,
    })
}

// Whitespace-only counts as empty.
fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::EmptyField { field })
    } else {
        Ok(())
    }
}
