//! Reliable messaging substrate for saga participants.
//!
//! A participant records a state change and the event announcing it in one
//! local transaction ([`OutboxWriter`]). The [`OutboxRelay`] later ships
//! committed, unprocessed rows to a [`MessageBus`] topic and only then marks
//! them processed, so delivery is at-least-once. On the receiving side a
//! [`SagaConsumer`] parses each message into a typed [`SagaEvent`] and hands
//! it to a [`SagaEventHandler`].

pub mod bus;
pub mod consumer;
pub mod error;
pub mod event;
pub mod memory;
pub mod nats;
pub mod postgres;
pub mod relay;
pub mod store;

pub use bus::{InMemoryMessageBus, MessageBus, MessageStream};
pub use consumer::{ConsumeOutcome, Disposition, SagaConsumer, SagaEventHandler};
pub use error::{OutboxError, Result};
pub use event::{
    EventId, EventPayload, NewOutboxEvent, OrderCreatedData, OrderStatusChangedData, OutboxEvent,
    SagaEvent, SalesCompletedData, SalesFailedData, SalesReversedData,
};
pub use memory::{InMemoryOutbox, OutboxBatch};
pub use nats::NatsMessageBus;
pub use postgres::PostgresOutbox;
pub use relay::{OutboxRelay, RelayConfig};
pub use store::{OutboxStore, OutboxWriter};
