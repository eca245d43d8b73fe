//! NATS core pub/sub implementation of the message bus.

use async_trait::async_trait;
use futures_util::StreamExt;

use crate::{MessageBus, MessageStream, OutboxError, Result, SagaEvent};

/// Message bus over NATS core subjects, one subject per topic.
///
/// Core NATS is fire-and-forget fan-out: subscribers only see messages
/// published while they are subscribed.
#[derive(Debug, Clone)]
pub struct NatsMessageBus {
    client: async_nats::Client,
}

impl NatsMessageBus {
    /// Connects to a NATS server.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = async_nats::connect(url)
            .await
            .map_err(|e| OutboxError::Connection(format!("failed to connect to NATS: {e}")))?;
        tracing::info!(%url, "connected to NATS");
        Ok(Self { client })
    }

    /// Wraps an existing client.
    pub fn from_client(client: async_nats::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MessageBus for NatsMessageBus {
    async fn publish(&self, topic: &str, event: &SagaEvent) -> Result<()> {
        let payload = event.to_json()?;
        self.client
            .publish(topic.to_string(), payload.into_bytes().into())
            .await
            .map_err(|e| OutboxError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;
        // Publish only buffers; flush so success means the server has it.
        self.client.flush().await.map_err(|e| OutboxError::Publish {
            topic: topic.to_string(),
            reason: e.to_string(),
        })
    }

    async fn subscribe(&self, topic: &str) -> Result<MessageStream> {
        let subscriber = self
            .client
            .subscribe(topic.to_string())
            .await
            .map_err(|e| OutboxError::Subscribe {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;

        let stream =
            subscriber.map(|message| String::from_utf8_lossy(&message.payload).into_owned());
        Ok(Box::pin(stream))
    }
}
