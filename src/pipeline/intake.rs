//! Shared intake stages: dedup → filter → normalize, then publish.
//!
//! Adapters own the I/O and the acknowledgement. They call `prepare()` to
//! turn an event into a draft (or learn why it was skipped) and `publish()`
//! to hand the draft to the downstream queue.

use tracing::{debug, warn};

use crate::error::PublishError;
use crate::pipeline::publisher::OutboundPublisher;
use crate::pipeline::rules::IntakeFilter;
use crate::ticket::{Channel, RawChannelEvent, SeenIds, SkipReason, TicketDraft, normalize};

/// Channel-agnostic intake shared by every adapter.
pub struct Intake {
    filter: IntakeFilter,
    publisher: OutboundPublisher,
    seen: SeenIds,
}

impl Intake {
    pub fn new(filter: IntakeFilter, publisher: OutboundPublisher) -> Self {
        Self {
            filter,
            publisher,
            seen: SeenIds::default(),
        }
    }

    /// Replace the dedup window (mainly to shrink it in tests).
    pub fn with_seen_ids(mut self, seen: SeenIds) -> Self {
        self.seen = seen;
        self
    }

    pub fn publisher(&self) -> &OutboundPublisher {
        &self.publisher
    }

    /// Turn an event into a draft. Consumes the event.
    ///
    /// A repeated external id, a filter match or a validation failure yields
    /// the matching `SkipReason`; the event must then not be published or
    /// acknowledged.
    pub fn prepare(&self, event: RawChannelEvent) -> Result<TicketDraft, SkipReason> {
        let key = dedup_key(event.channel, &event.external_id);
        if !self.seen.insert(&key) {
            debug!(
                channel = %event.channel,
                external_id = %event.external_id,
                "Duplicate event skipped"
            );
            return Err(SkipReason::Duplicate {
                external_id: event.external_id,
            });
        }

        if let Some(reason) = self.filter.evaluate(&event) {
            return Err(reason);
        }

        let channel = event.channel;
        let external_id = event.external_id.clone();
        normalize(event).map_err(|e| {
            warn!(
                channel = %channel,
                external_id = %external_id,
                error = %e,
                "Event rejected by normalizer"
            );
            SkipReason::Invalid(e)
        })
    }

    /// Publish a prepared draft.
    ///
    /// On failure the draft's id leaves the dedup window, so a redelivery of
    /// the same event is processed again.
    pub async fn publish(&self, draft: &TicketDraft) -> Result<(), PublishError> {
        let result = self.publisher.publish(draft).await;
        if result.is_err() {
            self.seen
                .remove(&dedup_key(draft.channel, &draft.external_id));
        }
        result
    }
}

fn dedup_key(channel: Channel, external_id: &str) -> String {
    format!("{channel}:{external_id}")
}
