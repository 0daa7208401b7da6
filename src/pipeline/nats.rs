//! NATS queue transport.
//!
//! The queue name is used as the NATS subject. Each send is a core publish
//! followed by a flush, so a returned `Ok` means the server has the bytes.

use async_nats::Client;
use async_trait::async_trait;
use bytes::Bytes;
use tracing::info;

use crate::error::PublishError;
use crate::pipeline::publisher::QueueTransport;

/// Queue transport backed by a NATS connection.
#[derive(Clone)]
pub struct NatsTransport {
    client: Client,
}

impl NatsTransport {
    /// Connect to a NATS server.
    pub async fn connect(url: &str) -> Result<Self, async_nats::ConnectError> {
        info!("Connecting to NATS at {}", url);
        let client = async_nats::connect(url).await?;
        Ok(Self { client })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl QueueTransport for NatsTransport {
    fn name(&self) -> &str {
        "nats"
    }

    async fn send(&self, queue: &str, payload: Bytes) -> Result<(), PublishError> {
        self.client
            .publish(queue.to_string(), payload)
            .await
            .map_err(|e| PublishError::Transport {
                queue: queue.to_string(),
                reason: e.to_string(),
            })?;

        self.client
            .flush()
            .await
            .map_err(|e| PublishError::Transport {
                queue: queue.to_string(),
                reason: format!("flush failed: {e}"),
            })
    }
}
