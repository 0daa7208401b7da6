//! Outbound publisher: hands ticket drafts to the classification queue.
//!
//! One `publish()` call is one send attempt. There is no retry loop here;
//! a failed publish surfaces as a single `PublishError` and the draft can be
//! re-published as-is because its `external_id` is stable.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info};

use crate::error::PublishError;
use crate::ticket::TicketDraft;

/// Default broadcast channel capacity for the in-memory queue.
const DEFAULT_BROADCAST_CAPACITY: usize = 256;

/// Default number of messages the in-memory queue keeps for inspection.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1024;

/// Wire-level queue client. Implementations only move bytes.
#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Transport name for logging (e.g. "nats", "memory").
    fn name(&self) -> &str;

    /// Send one message to `queue`.
    async fn send(&self, queue: &str, payload: Bytes) -> Result<(), PublishError>;
}

/// Serializes drafts and sends them to one named queue.
#[derive(Clone)]
pub struct OutboundPublisher {
    transport: Arc<dyn QueueTransport>,
    queue_name: String,
}

impl OutboundPublisher {
    pub fn new(transport: Arc<dyn QueueTransport>, queue_name: impl Into<String>) -> Self {
        Self {
            transport,
            queue_name: queue_name.into(),
        }
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Publish one draft. Not deduplicating: two calls send two messages.
    pub async fn publish(&self, draft: &TicketDraft) -> Result<(), PublishError> {
        let payload = encode_draft(draft)?;
        let size = payload.len();

        self.transport.send(&self.queue_name, payload).await?;

        info!(
            queue = %self.queue_name,
            transport = self.transport.name(),
            channel = %draft.channel,
            external_id = %draft.external_id,
            bytes = size,
            "Ticket draft published"
        );
        Ok(())
    }
}

/// Encode a draft into the queue's JSON wire format.
pub fn encode_draft(draft: &TicketDraft) -> Result<Bytes, PublishError> {
    Ok(Bytes::from(serde_json::to_vec(draft)?))
}

// ── In-memory queue ─────────────────────────────────────────────────

/// A message as the in-memory queue received it.
#[derive(Debug, Clone)]
pub struct QueuedMessage {
    pub queue: String,
    pub payload: Bytes,
}

impl QueuedMessage {
    /// Decode the payload as JSON.
    pub fn json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }
}

/// In-process queue: keeps the most recent messages and fans out to
/// subscribers.
///
/// Used when no broker is configured, and by tests. Once the history is
/// full the oldest message is dropped; subscribers still see every message.
pub struct MemoryQueue {
    messages: RwLock<VecDeque<QueuedMessage>>,
    capacity: usize,
    tx: broadcast::Sender<QueuedMessage>,
}

impl MemoryQueue {
    pub fn new() -> Arc<Self> {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    /// Queue that keeps at most `capacity` messages (minimum 1).
    pub fn with_capacity(capacity: usize) -> Arc<Self> {
        let capacity = capacity.max(1);
        let (tx, _rx) = broadcast::channel(DEFAULT_BROADCAST_CAPACITY);
        Arc::new(Self {
            messages: RwLock::new(VecDeque::with_capacity(capacity.min(DEFAULT_HISTORY_CAPACITY))),
            capacity,
            tx,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Subscribe to messages as they are published.
    pub fn subscribe(&self) -> broadcast::Receiver<QueuedMessage> {
        self.tx.subscribe()
    }

    /// Snapshot of the retained messages, oldest first.
    pub async fn messages(&self) -> Vec<QueuedMessage> {
        self.messages.read().await.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.messages.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.messages.read().await.is_empty()
    }
}

#[async_trait]
impl QueueTransport for MemoryQueue {
    fn name(&self) -> &str {
        "memory"
    }

    async fn send(&self, queue: &str, payload: Bytes) -> Result<(), PublishError> {
        let msg = QueuedMessage {
            queue: queue.to_string(),
            payload,
        };
        {
            let mut messages = self.messages.write().await;
            if messages.len() >= self.capacity {
                messages.pop_front();
            }
            messages.push_back(msg.clone());
        }
        debug!(queue = %queue, "Message stored in memory queue");

        // ok if nobody is subscribed
        let _ = self.tx.send(msg);
        Ok(())
    }
}
