use async_trait::async_trait;

use crate::{NewOutboxEvent, OutboxEvent, Result};

/// The Outbox Writer: records an event inside an open local transaction.
///
/// Implemented by the transaction handles of participant stores. Whatever
/// the handle writes to primary state and whatever it writes here commit or
/// roll back together.
#[async_trait]
pub trait OutboxWriter: Send {
    /// Adds one outbox row to the transaction.
    async fn write_event(&mut self, event: NewOutboxEvent) -> Result<()>;
}

/// Read side of the outbox, used by the relay.
///
/// Only committed rows are ever visible here.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Returns all rows with `processed = false`, oldest first.
    async fn fetch_unprocessed(&self) -> Result<Vec<OutboxEvent>>;

    /// Flips the processed flag of a row from false to true.
    ///
    /// Marking an already processed row is a no-op.
    async fn mark_processed(&self, id: i64) -> Result<()>;
}
