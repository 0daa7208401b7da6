//! Email channel: sweeps the mailbox for unread messages and turns each
//! plain-text message into a ticket.
//!
//! One cycle = connect → `SEARCH UNSEEN` → fetch each message → extract →
//! publish → acknowledge. The session is closed on every exit path by
//! `ScopedSession`. Nothing in a cycle is retried; the next cycle starts
//! with a fresh connection.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use mail_parser::{MessageParser, MimeHeaders, PartType};
use tracing::{debug, error, info, warn};

use crate::channels::ack::Acknowledger;
use crate::channels::imap::{MailSession, MailSource};
use crate::error::{ChannelError, ExtractionError};
use crate::pipeline::Intake;
use crate::ticket::{Channel, RawChannelEvent};

// ── Session guard ───────────────────────────────────────────────────

/// Owns an open mail session and closes it when dropped.
pub struct ScopedSession {
    inner: Box<dyn MailSession>,
}

impl ScopedSession {
    pub fn new(inner: Box<dyn MailSession>) -> Self {
        Self { inner }
    }
}

impl Deref for ScopedSession {
    type Target = dyn MailSession;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl DerefMut for ScopedSession {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.inner
    }
}

impl Drop for ScopedSession {
    fn drop(&mut self) {
        if let Err(e) = self.inner.close() {
            warn!(error = %e, "Failed to close mail session");
        }
    }
}

// ── Cycle results ───────────────────────────────────────────────────

/// Events extracted in one sweep.
#[derive(Debug, Default)]
pub struct FetchBatch {
    pub events: Vec<RawChannelEvent>,
    /// Messages that produced no event (unreadable, no text/plain part, no sender).
    pub extraction_failures: usize,
    /// Set when the sweep ended early. `events` still holds what was
    /// extracted before the failure; those messages are already marked seen.
    pub error: Option<ChannelError>,
}

/// Counters for one poll cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub connected: bool,
    pub fetched: usize,
    pub published: usize,
    pub skipped: usize,
    pub failed: usize,
    pub acknowledged: usize,
    pub extraction_failures: usize,
}

// ── Adapter ─────────────────────────────────────────────────────────

/// Email channel adapter.
pub struct EmailAdapter {
    source: Arc<dyn MailSource>,
    intake: Arc<Intake>,
    acknowledger: Arc<dyn Acknowledger>,
}

impl EmailAdapter {
    pub fn new(
        source: Arc<dyn MailSource>,
        intake: Arc<Intake>,
        acknowledger: Arc<dyn Acknowledger>,
    ) -> Self {
        Self {
            source,
            intake,
            acknowledger,
        }
    }

    /// Open an authenticated session with the inbox selected.
    pub async fn connect(&self) -> Result<ScopedSession, ChannelError> {
        let source = Arc::clone(&self.source);
        tokio::task::spawn_blocking(move || source.open().map(ScopedSession::new))
            .await
            .map_err(|e| ChannelError::Connection {
                name: "email".into(),
                reason: format!("connect task failed: {e}"),
            })?
    }

    /// Fetch every unread message and extract one event per message.
    ///
    /// Fails only when no session could be opened. Errors after that end
    /// the sweep early and are reported in `FetchBatch::error`.
    pub async fn fetch_new_events(&self) -> Result<FetchBatch, ChannelError> {
        let session = self.connect().await?;
        tokio::task::spawn_blocking(move || sweep(session))
            .await
            .map_err(|e| ChannelError::Protocol {
                name: "email".into(),
                reason: format!("sweep task failed: {e}"),
            })
    }

    /// Run one full cycle. Never fails; problems are logged and counted.
    pub async fn poll_cycle(&self) -> CycleReport {
        let mut report = CycleReport::default();

        let batch = match self.fetch_new_events().await {
            Ok(batch) => batch,
            Err(e) => {
                error!(error = %e, "Email connection failed, skipping cycle");
                return report;
            }
        };
        report.connected = true;
        report.fetched = batch.events.len();
        report.extraction_failures = batch.extraction_failures;
        if let Some(e) = &batch.error {
            error!(
                error = %e,
                extracted = batch.events.len(),
                "Email fetch ended early"
            );
        }

        for event in batch.events {
            self.process(event, &mut report).await;
        }

        info!(
            fetched = report.fetched,
            published = report.published,
            skipped = report.skipped,
            failed = report.failed,
            acknowledged = report.acknowledged,
            extraction_failures = report.extraction_failures,
            "Email poll cycle complete"
        );
        report
    }

    async fn process(&self, event: RawChannelEvent, report: &mut CycleReport) {
        let external_id = event.external_id.clone();
        let draft = match self.intake.prepare(event) {
            Ok(draft) => draft,
            Err(reason) => {
                debug!(external_id = %external_id, reason = reason.label(), "Email skipped");
                report.skipped += 1;
                return;
            }
        };

        match self.intake.publish(&draft).await {
            Ok(()) => report.published += 1,
            Err(e) => {
                error!(external_id = %external_id, error = %e, "Failed to publish email ticket");
                report.failed += 1;
            }
        }

        // Ack regardless of the publish result; the message is already seen.
        match self.acknowledger.acknowledge(&draft).await {
            Ok(()) => report.acknowledged += 1,
            Err(e) => warn!(
                external_id = %external_id,
                acknowledger = self.acknowledger.name(),
                error = %e,
                "Email acknowledgement failed"
            ),
        }
    }
}

/// Blocking sweep over an open session. The session closes when this returns.
fn sweep(mut session: ScopedSession) -> FetchBatch {
    let mut batch = FetchBatch::default();

    let ids = match session.search_unseen() {
        Ok(ids) => ids,
        Err(e) => {
            batch.error = Some(e);
            return batch;
        }
    };
    debug!(unseen = ids.len(), "Unseen messages found");

    for id in ids {
        let raw = match session.fetch_rfc822(&id) {
            Ok(raw) => raw,
            Err(e @ ChannelError::Protocol { .. }) => {
                warn!(mail_id = %id, error = %e, "Skipping message that could not be fetched");
                batch.extraction_failures += 1;
                continue;
            }
            Err(e) => {
                batch.error = Some(e);
                break;
            }
        };

        match extract_event(&id, &raw) {
            Ok(event) => batch.events.push(event),
            Err(e) => {
                warn!(mail_id = %id, error = %e, "Skipping message");
                batch.extraction_failures += 1;
            }
        }
    }

    batch
}

// ── Extraction ──────────────────────────────────────────────────────

/// Turn one raw RFC 822 message into an event.
pub fn extract_event(mail_id: &str, raw: &[u8]) -> Result<RawChannelEvent, ExtractionError> {
    let parsed = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| ExtractionError::Unparseable { id: mail_id.into() })?;

    let sender = extract_sender(&parsed).ok_or_else(|| ExtractionError::NoSender {
        id: mail_id.into(),
    })?;
    let body = first_plain_text(&parsed).ok_or_else(|| ExtractionError::NoPlainText {
        id: mail_id.into(),
    })?;

    let subject = parsed.subject().unwrap_or_default().to_string();
    let message_id = parsed.message_id().map(str::to_string);
    let external_id = message_id
        .clone()
        .unwrap_or_else(|| format!("mail:{mail_id}"));
    let received_at = parsed
        .date()
        .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0))
        .unwrap_or_else(Utc::now);

    let raw_payload = serde_json::json!({
        "mail_id": mail_id,
        "message_id": message_id,
        "from": sender,
        "to": extract_addresses(parsed.to()),
        "subject": subject,
        "date": received_at.to_rfc3339(),
    });

    Ok(RawChannelEvent {
        channel: Channel::Email,
        external_id,
        conversation_id: sender.clone(),
        sender_id: sender,
        body,
        raw_payload,
        received_at,
    })
}

/// Sender address from the `From` header.
fn extract_sender(parsed: &mail_parser::Message) -> Option<String> {
    parsed
        .from()
        .and_then(|addr| addr.first())
        .and_then(|a| a.address())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// First `text/plain` part that is not an attachment.
fn first_plain_text(parsed: &mail_parser::Message) -> Option<String> {
    parsed.parts.iter().find_map(|part| {
        let PartType::Text(text) = &part.body else {
            return None;
        };
        let is_plain = MimeHeaders::content_type(part).is_none_or(|ct| {
            ct.ctype().eq_ignore_ascii_case("text")
                && ct
                    .subtype()
                    .is_none_or(|sub| sub.eq_ignore_ascii_case("plain"))
        });
        let is_attachment =
            MimeHeaders::content_disposition(part).is_some_and(|cd| cd.is_attachment());
        (is_plain && !is_attachment).then(|| text.to_string())
    })
}

/// Email addresses from an optional address header.
pub fn extract_addresses(addr: Option<&mail_parser::Address>) -> Vec<String> {
    let Some(addr) = addr else {
        return Vec::new();
    };
    match addr {
        mail_parser::Address::List(addrs) => addrs
            .iter()
            .filter_map(|a| a.address.as_ref().map(|s| s.to_string()))
            .collect(),
        mail_parser::Address::Group(groups) => groups
            .iter()
            .flat_map(|g| {
                g.addresses
                    .iter()
                    .filter_map(|a| a.address.as_ref().map(|s| s.to_string()))
            })
            .collect(),
    }
}

#[cfg(test)]
#[path = "email_tests.rs"]
mod tests;
