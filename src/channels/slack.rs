//! Slack chat adapter: turns Events API message events into tickets.
//!
//! Outbound calls go through the Web API (`chat.postMessage`) behind the
//! `ChatApi` trait so the adapter can be driven without Slack.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::channels::ack::Acknowledger;
use crate::config::SlackConfig;
use crate::error::{ChannelError, IntakeError};
use crate::pipeline::Intake;
use crate::ticket::{Channel, RawChannelEvent, SkipReason, TicketDraft, TicketOutcome};

/// Outbound chat operations the adapter needs.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Post `text` into `channel`. Returns the message timestamp if Slack sent one.
    async fn post_message(&self, channel: &str, text: &str)
    -> Result<Option<String>, ChannelError>;
}

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    error: Option<String>,
    ts: Option<String>,
}

/// Minimal Slack Web API client.
pub struct SlackApi {
    client: Client,
    token: SecretString,
    api_base: String,
}

impl SlackApi {
    pub fn new(config: &SlackConfig) -> Self {
        Self {
            client: Client::new(),
            token: config.bot_token.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ChatApi for SlackApi {
    async fn post_message(
        &self,
        channel: &str,
        text: &str,
    ) -> Result<Option<String>, ChannelError> {
        let body = serde_json::json!({
            "channel": channel,
            "text": text,
        });

        let resp = self
            .client
            .post(format!("{}/chat.postMessage", self.api_base))
            .bearer_auth(self.token.expose_secret())
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ChannelError::SendFailed {
                name: "slack".into(),
                reason: format!("chat.postMessage returned {status}"),
            });
        }

        let parsed: PostMessageResponse = resp.json().await?;
        if !parsed.ok {
            return Err(ChannelError::SendFailed {
                name: "slack".into(),
                reason: parsed.error.unwrap_or_else(|| "unknown error".into()),
            });
        }
        Ok(parsed.ts)
    }
}

// ── Adapter ─────────────────────────────────────────────────────────

/// Chat adapter for Slack message events.
pub struct SlackAdapter {
    api: Arc<dyn ChatApi>,
    intake: Arc<Intake>,
    acknowledger: Arc<dyn Acknowledger>,
}

impl SlackAdapter {
    pub fn new(
        api: Arc<dyn ChatApi>,
        intake: Arc<Intake>,
        acknowledger: Arc<dyn Acknowledger>,
    ) -> Self {
        Self {
            api,
            intake,
            acknowledger,
        }
    }

    /// Handle one inbound message event.
    ///
    /// `event_id` is the Events API envelope id when the event arrived
    /// wrapped in an `event_callback`; it becomes the dedup key.
    pub async fn handle_incoming_event(
        &self,
        event: Value,
        event_id: Option<&str>,
    ) -> TicketOutcome {
        if is_bot_event(&event) {
            debug!("Ignoring bot-authored Slack event");
            return TicketOutcome::Skipped(SkipReason::OwnMessage);
        }

        let raw = match to_raw_event(event, event_id) {
            Ok(raw) => raw,
            Err(reason) => {
                debug!(reason = reason.label(), "Slack event is not a support request");
                return TicketOutcome::Skipped(reason);
            }
        };

        let draft = match self.intake.prepare(raw) {
            Ok(draft) => draft,
            Err(reason) => return TicketOutcome::Skipped(reason),
        };

        if let Err(e) = self.intake.publish(&draft).await {
            error!(
                external_id = %draft.external_id,
                error = %e,
                "Error processing Slack message"
            );
            return TicketOutcome::Failed(IntakeError::Publish(e));
        }

        if let Err(e) = self.acknowledger.acknowledge(&draft).await {
            error!(
                channel_id = %draft.channel_id,
                error = %e,
                "Error sending Slack acknowledgement"
            );
            return TicketOutcome::Failed(IntakeError::Ack(e));
        }

        info!(
            channel_id = %draft.channel_id,
            external_id = %draft.external_id,
            "Slack ticket created"
        );
        TicketOutcome::Created(draft)
    }

    /// Post an agent response into the conversation a ticket came from.
    pub async fn send_response(
        &self,
        draft: &TicketDraft,
        message: &str,
    ) -> Result<(), ChannelError> {
        self.api
            .post_message(&draft.channel_id, message)
            .await
            .map(|_| ())
            .inspect_err(|e| {
                warn!(channel_id = %draft.channel_id, error = %e, "Error sending Slack response");
            })
    }
}

fn is_bot_event(event: &Value) -> bool {
    event.get("bot_id").is_some_and(|v| !v.is_null())
        || event.get("subtype").and_then(Value::as_str) == Some("bot_message")
}

/// Non-empty string field, or `None`.
fn field<'a>(event: &'a Value, key: &str) -> Option<&'a str> {
    event
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

fn to_raw_event(event: Value, event_id: Option<&str>) -> Result<RawChannelEvent, SkipReason> {
    let channel = field(&event, "channel");
    let user = field(&event, "user");
    let text = field(&event, "text");

    let (Some(channel), Some(user), Some(text)) = (channel, user, text) else {
        let missing = [("channel", channel), ("user", user), ("text", text)]
            .into_iter()
            .filter(|(_, v)| v.is_none())
            .map(|(k, _)| k)
            .collect();
        return Err(SkipReason::NotASupportRequest { missing });
    };

    let ts = field(&event, "ts");
    let external_id = event_id
        .map(String::from)
        .or_else(|| field(&event, "client_msg_id").map(String::from))
        .or_else(|| ts.map(|ts| format!("{channel}:{ts}")))
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let received_at = ts.and_then(parse_slack_ts).unwrap_or_else(Utc::now);
    let conversation_id = channel.to_string();
    let sender_id = user.to_string();
    let body = text.to_string();

    Ok(RawChannelEvent {
        channel: Channel::Slack,
        external_id,
        conversation_id,
        sender_id,
        body,
        raw_payload: event,
        received_at,
    })
}

/// Slack timestamps are `"<unix seconds>.<micros>"`.
fn parse_slack_ts(ts: &str) -> Option<DateTime<Utc>> {
    let (secs, frac) = ts.split_once('.').unwrap_or((ts, "0"));
    let secs: i64 = secs.parse().ok()?;
    let micros: u32 = frac.parse().ok()?;
    DateTime::from_timestamp(secs, micros.checked_mul(1_000)?)
}
