//! Publish/subscribe message bus port and its in-process implementation.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures_core::Stream;
use tokio::sync::{Mutex, broadcast};

use crate::{OutboxError, Result, SagaEvent};

/// A stream of raw text messages received on one topic.
pub type MessageStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// Topic-based publish/subscribe channel carrying serialized saga events.
///
/// Subscribers receive the raw text so that malformed messages can be
/// observed and dropped by the consumer rather than by the transport.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publishes an event to a topic. Returns once the transport accepted it.
    async fn publish(&self, topic: &str, event: &SagaEvent) -> Result<()>;

    /// Subscribes to a topic. Only messages published after the call returns
    /// are delivered.
    async fn subscribe(&self, topic: &str) -> Result<MessageStream>;
}

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Default)]
struct BusState {
    channels: HashMap<String, broadcast::Sender<String>>,
    published: HashMap<String, Vec<String>>,
    recording: bool,
    fail_on_publish: bool,
}

impl BusState {
    fn sender(&mut self, topic: &str) -> broadcast::Sender<String> {
        self.channels
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

/// In-process message bus backed by one broadcast channel per topic.
///
/// A bus built with [`InMemoryMessageBus::with_recording`] also keeps a log
/// of everything published so tests can assert on deliveries.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMessageBus {
    state: Arc<Mutex<BusState>>,
}

impl InMemoryMessageBus {
    /// Creates a new in-memory bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a bus that logs every published message for [`Self::published`].
    pub fn with_recording() -> Self {
        let state = BusState {
            recording: true,
            ..BusState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Publishes a raw text message, bypassing serialization.
    pub async fn publish_raw(&self, topic: &str, message: impl Into<String>) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.fail_on_publish {
            return Err(OutboxError::Publish {
                topic: topic.to_string(),
                reason: "bus unavailable".to_string(),
            });
        }

        let message = message.into();
        if state.recording {
            state
                .published
                .entry(topic.to_string())
                .or_default()
                .push(message.clone());
        }
        // No subscribers is not an error for a pub/sub channel.
        let _ = state.sender(topic).send(message);
        Ok(())
    }

    /// Makes every publish fail until reset.
    pub async fn set_fail_on_publish(&self, fail: bool) {
        self.state.lock().await.fail_on_publish = fail;
    }

    /// Returns every message published to a topic, in order. Always empty
    /// unless the bus was built with [`Self::with_recording`].
    pub async fn published(&self, topic: &str) -> Vec<String> {
        self.state
            .lock()
            .await
            .published
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }

    /// Returns the parsed events published to a topic, skipping malformed ones.
    pub async fn published_events(&self, topic: &str) -> Vec<SagaEvent> {
        self.published(topic)
            .await
            .iter()
            .filter_map(|m| SagaEvent::from_json(m).ok())
            .collect()
    }
}

#[async_trait]
impl MessageBus for InMemoryMessageBus {
    async fn publish(&self, topic: &str, event: &SagaEvent) -> Result<()> {
        let message = event.to_json()?;
        self.publish_raw(topic, message).await
    }

    async fn subscribe(&self, topic: &str) -> Result<MessageStream> {
        let receiver = self.state.lock().await.sender(topic).subscribe();
        let topic = topic.to_string();

        let stream = futures_util::stream::unfold(receiver, move |mut receiver| {
            let topic = topic.clone();
            async move {
                loop {
                    match receiver.recv().await {
                        Ok(message) => return Some((message, receiver)),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(%topic, skipped, "subscriber lagged, messages dropped");
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            }
        });

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EventPayload, SalesFailedData};
    use futures_util::StreamExt;

    fn event() -> SagaEvent {
        SagaEvent::new(
            7,
            EventPayload::SalesTransactionFailed(SalesFailedData {
                error: "declined".to_string(),
            }),
        )
    }

    #[tokio::test]
    async fn test_subscriber_receives_published_event() {
        let bus = InMemoryMessageBus::new();
        let mut stream = bus.subscribe("saga_responses").await.unwrap();

        let sent = event();
        bus.publish("saga_responses", &sent).await.unwrap();

        let raw = stream.next().await.unwrap();
        assert_eq!(SagaEvent::from_json(&raw).unwrap(), sent);
    }

    #[tokio::test]
    async fn test_topics_are_isolated() {
        let bus = InMemoryMessageBus::with_recording();
        bus.publish("saga_events", &event()).await.unwrap();

        assert_eq!(bus.published("saga_events").await.len(), 1);
        assert!(bus.published("saga_responses").await.is_empty());
    }

    #[tokio::test]
    async fn test_fail_on_publish() {
        let bus = InMemoryMessageBus::with_recording();
        bus.set_fail_on_publish(true).await;

        let result = bus.publish("saga_events", &event()).await;
        assert!(matches!(result, Err(OutboxError::Publish { .. })));
        assert!(bus.published("saga_events").await.is_empty());
    }

    #[tokio::test]
    async fn test_plain_bus_keeps_no_log() {
        let bus = InMemoryMessageBus::new();
        let mut stream = bus.subscribe("saga_events").await.unwrap();

        for _ in 0..3 {
            bus.publish("saga_events", &event()).await.unwrap();
        }

        assert!(stream.next().await.is_some());
        assert!(bus.published("saga_events").await.is_empty());
        assert!(bus.state.lock().await.published.is_empty());
    }
}
