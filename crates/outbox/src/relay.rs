//! Outbox relay: ships committed outbox rows to the message bus.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::{MessageBus, OutboxStore, Result, SagaEvent};

/// Configuration for the outbox relay.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Topic the relay publishes to.
    pub topic: String,
    /// Sleep between successful poll cycles.
    pub poll_interval: Duration,
    /// Sleep after a failed cycle before the whole cycle is retried.
    pub backoff: Duration,
}

impl RelayConfig {
    /// Creates a config for a topic with the default intervals.
    pub fn for_topic(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            ..Self::default()
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            topic: common::topics::SAGA_EVENTS.to_string(),
            poll_interval: Duration::from_secs(2),
            backoff: Duration::from_secs(5),
        }
    }
}

/// Polls an outbox store and publishes unprocessed rows in creation order.
///
/// A row is marked processed only after the bus accepted it, so a failure
/// between the two steps leads to redelivery, never to loss.
pub struct OutboxRelay<S: OutboxStore> {
    store: S,
    bus: Arc<dyn MessageBus>,
    config: RelayConfig,
}

impl<S: OutboxStore> OutboxRelay<S> {
    /// Creates a new relay.
    pub fn new(store: S, bus: Arc<dyn MessageBus>, config: RelayConfig) -> Self {
        Self { store, bus, config }
    }

    /// Returns the relay configuration.
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Runs one poll cycle and returns the number of events published.
    ///
    /// Stops at the first publish or update failure so later rows are not
    /// shipped ahead of an earlier one.
    #[tracing::instrument(skip(self), fields(topic = %self.config.topic))]
    pub async fn run_once(&self) -> Result<usize> {
        let rows = self.store.fetch_unprocessed().await.inspect_err(|_| {
            metrics::counter!("outbox_poll_failures_total").increment(1);
        })?;

        let mut published = 0;
        for row in &rows {
            let event = match SagaEvent::from_outbox(row) {
                Ok(event) => event,
                Err(e) => {
                    // Left unprocessed: retried every cycle and visible in the table.
                    metrics::counter!("outbox_undecodable_events_total").increment(1);
                    tracing::error!(
                        outbox_id = row.id,
                        event_type = %row.event_type,
                        error = %e,
                        "outbox row does not match its event schema, skipping"
                    );
                    continue;
                }
            };

            if let Err(e) = self.bus.publish(&self.config.topic, &event).await {
                metrics::counter!("outbox_publish_failures_total").increment(1);
                tracing::warn!(outbox_id = row.id, error = %e, "publish failed");
                return Err(e);
            }

            self.store.mark_processed(row.id).await?;
            published += 1;
            metrics::counter!("outbox_events_published_total").increment(1);
            tracing::debug!(
                outbox_id = row.id,
                event_id = %event.id,
                event_type = %event.event_type(),
                "outbox event published"
            );
        }

        Ok(published)
    }

    /// Runs poll cycles until the shutdown signal changes or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            topic = %self.config.topic,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "outbox relay started"
        );

        loop {
            let delay = match self.run_once().await {
                Ok(_) => self.config.poll_interval,
                Err(e) => {
                    tracing::warn!(error = %e, backoff_ms = self.config.backoff.as_millis() as u64, "outbox cycle failed, backing off");
                    self.config.backoff
                }
            };

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => break,
            }
        }

        tracing::info!(topic = %self.config.topic, "outbox relay stopped");
    }
}
