//! Saga event consumer: subscribes to a topic and dispatches typed events.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::{MessageBus, Result, SagaEvent};

/// What a handler did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// A local state transition was applied.
    Applied,
    /// The event is not relevant to this handler (or already applied).
    Ignored,
}

/// Applies local state transitions in reaction to saga events.
///
/// Handlers must tolerate duplicates: the relay delivers at least once.
#[async_trait]
pub trait SagaEventHandler: Send + Sync + 'static {
    /// Error returned when applying an event fails.
    type Error: std::fmt::Display + Send;

    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Handles one event.
    async fn handle(&self, event: &SagaEvent) -> std::result::Result<Disposition, Self::Error>;
}

/// Outcome of processing one raw message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeOutcome {
    Applied,
    Ignored,
    /// Not parseable as a saga event; dropped.
    Malformed,
    /// Parsed, but the handler returned an error.
    Failed,
}

impl ConsumeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsumeOutcome::Applied => "applied",
            ConsumeOutcome::Ignored => "ignored",
            ConsumeOutcome::Malformed => "malformed",
            ConsumeOutcome::Failed => "failed",
        }
    }
}

/// Long-lived subscriber that feeds one topic into a [`SagaEventHandler`].
///
/// Messages are handled one at a time in arrival order. No single message,
/// however broken, ends the subscription.
pub struct SagaConsumer<H: SagaEventHandler> {
    bus: Arc<dyn MessageBus>,
    topic: String,
    handler: H,
}

impl<H: SagaEventHandler> SagaConsumer<H> {
    /// Creates a consumer for a topic.
    pub fn new(bus: Arc<dyn MessageBus>, topic: impl Into<String>, handler: H) -> Self {
        Self {
            bus,
            topic: topic.into(),
            handler,
        }
    }

    /// Returns the handler.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Parses and dispatches one raw message.
    pub async fn process_message(&self, raw: &str) -> ConsumeOutcome {
        let outcome = match SagaEvent::from_json(raw) {
            Err(e) => {
                tracing::warn!(
                    topic = %self.topic,
                    handler = self.handler.name(),
                    error = %e,
                    "dropping malformed saga message"
                );
                ConsumeOutcome::Malformed
            }
            Ok(event) => match self.handler.handle(&event).await {
                Ok(Disposition::Applied) => {
                    tracing::info!(
                        handler = self.handler.name(),
                        event_id = %event.id,
                        event_type = %event.event_type(),
                        aggregate_id = event.aggregate_id,
                        "saga event applied"
                    );
                    ConsumeOutcome::Applied
                }
                Ok(Disposition::Ignored) => {
                    tracing::debug!(
                        handler = self.handler.name(),
                        event_type = %event.event_type(),
                        "saga event ignored"
                    );
                    ConsumeOutcome::Ignored
                }
                Err(e) => {
                    tracing::error!(
                        handler = self.handler.name(),
                        event_id = %event.id,
                        event_type = %event.event_type(),
                        aggregate_id = event.aggregate_id,
                        error = %e,
                        "failed to apply saga event"
                    );
                    ConsumeOutcome::Failed
                }
            },
        };

        metrics::counter!("saga_consumer_messages_total", "outcome" => outcome.as_str())
            .increment(1);
        outcome
    }

    /// Subscribes to the topic and spawns the consume loop.
    ///
    /// The subscription is established before this returns, so anything
    /// published afterwards is seen by the loop. The loop ends when the
    /// shutdown signal changes or the stream closes.
    pub async fn start(self, mut shutdown: watch::Receiver<bool>) -> Result<JoinHandle<()>> {
        let mut stream = self.bus.subscribe(&self.topic).await?;
        tracing::info!(topic = %self.topic, handler = self.handler.name(), "saga consumer subscribed");

        Ok(tokio::spawn(async move {
            loop {
                tokio::select! {
                    message = stream.next() => match message {
                        Some(raw) => {
                            self.process_message(&raw).await;
                        }
                        None => {
                            tracing::warn!(topic = %self.topic, "subscription closed");
                            break;
                        }
                    },
                    _ = shutdown.changed() => break,
                }
            }
            tracing::info!(topic = %self.topic, handler = self.handler.name(), "saga consumer stopped");
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EventPayload, InMemoryMessageBus, SalesCompletedData, SalesFailedData};
    use common::{Money, SalesId};
    use std::time::Duration;
    use tokio::sync::Mutex;

    /// Records completed aggregate ids; fails on aggregate 13.
    #[derive(Default, Clone)]
    struct RecordingHandler {
        applied: Arc<Mutex<Vec<i64>>>,
    }

    #[async_trait]
    impl SagaEventHandler for RecordingHandler {
        type Error = String;

        fn name(&self) -> &'static str {
            "recording"
        }

        async fn handle(&self, event: &SagaEvent) -> std::result::Result<Disposition, String> {
            match &event.payload {
                EventPayload::SalesTransactionCompleted(_) if event.aggregate_id == 13 => {
                    Err("unlucky".to_string())
                }
                EventPayload::SalesTransactionCompleted(_) => {
                    self.applied.lock().await.push(event.aggregate_id);
                    Ok(Disposition::Applied)
                }
                _ => Ok(Disposition::Ignored),
            }
        }
    }

    fn completed(order_id: i64) -> SagaEvent {
        SagaEvent::new(
            order_id,
            EventPayload::SalesTransactionCompleted(SalesCompletedData {
                transaction_id: SalesId::new(7),
                final_amount: Money::from_cents(1798),
                discount_amount: Money::from_cents(200),
            }),
        )
    }

    fn consumer(bus: &InMemoryMessageBus, handler: RecordingHandler) -> SagaConsumer<RecordingHandler> {
        SagaConsumer::new(Arc::new(bus.clone()), "saga_responses", handler)
    }

    #[tokio::test]
    async fn test_process_message_outcomes() {
        let bus = InMemoryMessageBus::new();
        let c = consumer(&bus, RecordingHandler::default());

        let ok = completed(42).to_json().unwrap();
        assert_eq!(c.process_message(&ok).await, ConsumeOutcome::Applied);

        let other = SagaEvent::new(
            42,
            EventPayload::SalesTransactionFailed(SalesFailedData {
                error: "x".to_string(),
            }),
        );
        assert_eq!(
            c.process_message(&other.to_json().unwrap()).await,
            ConsumeOutcome::Ignored
        );

        assert_eq!(c.process_message("not json").await, ConsumeOutcome::Malformed);
        assert_eq!(
            c.process_message(&completed(13).to_json().unwrap()).await,
            ConsumeOutcome::Failed
        );
        assert_eq!(*c.handler().applied.lock().await, vec![42]);
    }

    #[tokio::test]
    async fn test_unknown_type_is_ignored() {
        let bus = InMemoryMessageBus::new();
        let c = consumer(&bus, RecordingHandler::default());

        let raw = serde_json::json!({
            "id": uuid::Uuid::new_v4(),
            "type": "SHIPMENT_DISPATCHED",
            "aggregate_id": 1,
            "data": {},
            "timestamp": "2024-01-01T00:00:00Z"
        })
        .to_string();

        assert_eq!(c.process_message(&raw).await, ConsumeOutcome::Ignored);
    }

    #[tokio::test]
    async fn test_loop_survives_bad_messages_in_arrival_order() {
        let bus = InMemoryMessageBus::new();
        let handler = RecordingHandler::default();
        let applied = handler.applied.clone();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = consumer(&bus, handler).start(shutdown_rx).await.unwrap();

        bus.publish("saga_responses", &completed(1)).await.unwrap();
        bus.publish_raw("saga_responses", "{garbage").await.unwrap();
        bus.publish("saga_responses", &completed(13)).await.unwrap();
        bus.publish("saga_responses", &completed(2)).await.unwrap();

        for _ in 0..100 {
            if applied.lock().await.len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(*applied.lock().await, vec![1, 2]);

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
