use chrono::{DateTime, Utc};
use common::{CustomerId, Money, SalesId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an event, doubling as its idempotency key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random event ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an event ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Event type tags as they appear in the outbox table and on the wire.
pub mod types {
    pub const ORDER_CREATED: &str = "ORDER_CREATED";
    pub const ORDER_STATUS_CHANGED: &str = "ORDER_STATUS_CHANGED";
    pub const SALES_TRANSACTION_COMPLETED: &str = "SALES_TRANSACTION_COMPLETED";
    pub const SALES_TRANSACTION_FAILED: &str = "SALES_TRANSACTION_FAILED";
    pub const SALES_TRANSACTION_REVERSED: &str = "SALES_TRANSACTION_REVERSED";
}

/// Data for ORDER_CREATED.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreatedData {
    pub customer_id: CustomerId,
    pub total_amount: Money,
}

/// Data for ORDER_STATUS_CHANGED.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderStatusChangedData {
    pub status: String,
}

/// Data for SALES_TRANSACTION_COMPLETED.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesCompletedData {
    pub transaction_id: SalesId,
    pub final_amount: Money,
    pub discount_amount: Money,
}

/// Data for SALES_TRANSACTION_FAILED.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesFailedData {
    pub error: String,
}

/// Data for SALES_TRANSACTION_REVERSED.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesReversedData {
    pub transaction_id: SalesId,
}

/// The closed set of events exchanged between participants.
///
/// `Unknown` keeps the raw type tag and data of anything a newer producer
/// emits, so older consumers can skip it instead of failing.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    OrderCreated(OrderCreatedData),
    OrderStatusChanged(OrderStatusChangedData),
    SalesTransactionCompleted(SalesCompletedData),
    SalesTransactionFailed(SalesFailedData),
    SalesTransactionReversed(SalesReversedData),
    Unknown {
        event_type: String,
        data: serde_json::Value,
    },
}

impl EventPayload {
    /// Returns the wire type tag.
    pub fn event_type(&self) -> &str {
        match self {
            EventPayload::OrderCreated(_) => types::ORDER_CREATED,
            EventPayload::OrderStatusChanged(_) => types::ORDER_STATUS_CHANGED,
            EventPayload::SalesTransactionCompleted(_) => types::SALES_TRANSACTION_COMPLETED,
            EventPayload::SalesTransactionFailed(_) => types::SALES_TRANSACTION_FAILED,
            EventPayload::SalesTransactionReversed(_) => types::SALES_TRANSACTION_REVERSED,
            EventPayload::Unknown { event_type, .. } => event_type,
        }
    }

    /// Serializes the variant's data document.
    pub fn data(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            EventPayload::OrderCreated(d) => serde_json::to_value(d),
            EventPayload::OrderStatusChanged(d) => serde_json::to_value(d),
            EventPayload::SalesTransactionCompleted(d) => serde_json::to_value(d),
            EventPayload::SalesTransactionFailed(d) => serde_json::to_value(d),
            EventPayload::SalesTransactionReversed(d) => serde_json::to_value(d),
            EventPayload::Unknown { data, .. } => Ok(data.clone()),
        }
    }

    /// Rebuilds a payload from its type tag and data document.
    ///
    /// Fails only when a known type carries data that does not match its schema.
    pub fn from_parts(event_type: &str, data: serde_json::Value) -> serde_json::Result<Self> {
        Ok(match event_type {
            types::ORDER_CREATED => EventPayload::OrderCreated(serde_json::from_value(data)?),
            types::ORDER_STATUS_CHANGED => {
                EventPayload::OrderStatusChanged(serde_json::from_value(data)?)
            }
            types::SALES_TRANSACTION_COMPLETED => {
                EventPayload::SalesTransactionCompleted(serde_json::from_value(data)?)
            }
            types::SALES_TRANSACTION_FAILED => {
                EventPayload::SalesTransactionFailed(serde_json::from_value(data)?)
            }
            types::SALES_TRANSACTION_REVERSED => {
                EventPayload::SalesTransactionReversed(serde_json::from_value(data)?)
            }
            other => EventPayload::Unknown {
                event_type: other.to_string(),
                data,
            },
        })
    }
}

/// A durable outbox row, as read back by the relay.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxEvent {
    /// Row identifier (insertion sequence).
    pub id: i64,
    /// Idempotency key, unique across the table.
    pub event_id: EventId,
    pub event_type: String,
    pub aggregate_id: i64,
    pub payload: serde_json::Value,
    pub processed: bool,
    pub created_at: DateTime<Utc>,
}

/// An outbox row about to be written inside a local transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOutboxEvent {
    pub event_id: EventId,
    pub event_type: String,
    pub aggregate_id: i64,
    pub payload: serde_json::Value,
}

impl NewOutboxEvent {
    /// Builds an outbox row from a typed payload.
    pub fn new(aggregate_id: impl Into<i64>, payload: &EventPayload) -> serde_json::Result<Self> {
        Ok(Self {
            event_id: EventId::new(),
            event_type: payload.event_type().to_string(),
            aggregate_id: aggregate_id.into(),
            payload: payload.data()?,
        })
    }
}

/// Wire form of a saga event: `{id, type, aggregate_id, data, timestamp}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SagaEventRecord {
    id: EventId,
    #[serde(rename = "type")]
    event_type: String,
    aggregate_id: i64,
    #[serde(default)]
    data: serde_json::Value,
    timestamp: DateTime<Utc>,
}

/// A transient message derived from an outbox row for transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SagaEventRecord", into = "SagaEventRecord")]
pub struct SagaEvent {
    pub id: EventId,
    pub aggregate_id: i64,
    pub payload: EventPayload,
    pub timestamp: DateTime<Utc>,
}

impl SagaEvent {
    /// Creates a new event with a fresh ID and the current timestamp.
    pub fn new(aggregate_id: impl Into<i64>, payload: EventPayload) -> Self {
        Self {
            id: EventId::new(),
            aggregate_id: aggregate_id.into(),
            payload,
            timestamp: Utc::now(),
        }
    }

    /// Derives the transport message for an outbox row.
    ///
    /// The event keeps the row's idempotency key and creation time, so a
    /// redelivered row is recognisable as the same event.
    pub fn from_outbox(row: &OutboxEvent) -> serde_json::Result<Self> {
        Ok(Self {
            id: row.event_id,
            aggregate_id: row.aggregate_id,
            payload: EventPayload::from_parts(&row.event_type, row.payload.clone())?,
            timestamp: row.created_at,
        })
    }

    /// Returns the wire type tag.
    pub fn event_type(&self) -> &str {
        self.payload.event_type()
    }

    /// Serializes the event to its JSON wire form.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parses an event from its JSON wire form.
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

impl TryFrom<SagaEventRecord> for SagaEvent {
    type Error = serde_json::Error;

    fn try_from(record: SagaEventRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: record.id,
            aggregate_id: record.aggregate_id,
            payload: EventPayload::from_parts(&record.event_type, record.data)?,
            timestamp: record.timestamp,
        })
    }
}

impl From<SagaEvent> for SagaEventRecord {
    fn from(event: SagaEvent) -> Self {
        let event_type = event.payload.event_type().to_string();
        // Data structs only hold ids, strings and Money, none of which fail to serialize.
        let data = event.payload.data().unwrap_or(serde_json::Value::Null);
        Self {
            id: event.id,
            event_type,
            aggregate_id: event.aggregate_id,
            data,
            timestamp: event.timestamp,
        }
    }
}
