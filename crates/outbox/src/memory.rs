use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::{NewOutboxEvent, OutboxError, OutboxEvent, OutboxStore, OutboxWriter, Result};

#[derive(Debug, Default)]
struct OutboxTable {
    rows: Vec<OutboxEvent>,
    next_id: i64,
    fail_on_fetch: bool,
    fail_on_mark: bool,
}

/// In-memory outbox table for tests and single-process runs.
///
/// Rows become visible only through [`InMemoryOutbox::commit`], which is
/// what makes a staged [`OutboxBatch`] behave like an uncommitted
/// transaction.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOutbox {
    table: Arc<RwLock<OutboxTable>>,
}

impl InMemoryOutbox {
    /// Creates a new empty outbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts staging rows for a new local transaction.
    pub fn begin(&self) -> OutboxBatch {
        OutboxBatch::default()
    }

    /// Makes every staged row of the batch visible at once.
    ///
    /// Rows whose event ID already exists are skipped, like the unique
    /// idempotency key on the database table.
    pub async fn commit(&self, batch: OutboxBatch) {
        let mut table = self.table.write().await;
        for event in batch.events {
            if table.rows.iter().any(|r| r.event_id == event.event_id) {
                continue;
            }
            table.next_id += 1;
            let id = table.next_id;
            table.rows.push(OutboxEvent {
                id,
                event_id: event.event_id,
                event_type: event.event_type,
                aggregate_id: event.aggregate_id,
                payload: event.payload,
                processed: false,
                created_at: Utc::now(),
            });
        }
    }

    /// Returns every committed row, processed or not.
    pub async fn all_events(&self) -> Vec<OutboxEvent> {
        self.table.read().await.rows.clone()
    }

    /// Returns the number of committed rows.
    pub async fn len(&self) -> usize {
        self.table.read().await.rows.len()
    }

    /// Returns true if no row has been committed.
    pub async fn is_empty(&self) -> bool {
        self.table.read().await.rows.is_empty()
    }

    /// Returns the number of rows still waiting for the relay.
    pub async fn unprocessed_count(&self) -> usize {
        self.table
            .read()
            .await
            .rows
            .iter()
            .filter(|r| !r.processed)
            .count()
    }

    /// Makes `fetch_unprocessed` fail, simulating an unreachable database.
    pub async fn set_fail_on_fetch(&self, fail: bool) {
        self.table.write().await.fail_on_fetch = fail;
    }

    /// Makes `mark_processed` fail, simulating a crash after publish.
    pub async fn set_fail_on_mark(&self, fail: bool) {
        self.table.write().await.fail_on_mark = fail;
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutbox {
    async fn fetch_unprocessed(&self) -> Result<Vec<OutboxEvent>> {
        let table = self.table.read().await;
        if table.fail_on_fetch {
            return Err(OutboxError::Unavailable("outbox read failed".to_string()));
        }
        let mut rows: Vec<_> = table.rows.iter().filter(|r| !r.processed).cloned().collect();
        rows.sort_by_key(|r| (r.created_at, r.id));
        Ok(rows)
    }

    async fn mark_processed(&self, id: i64) -> Result<()> {
        let mut table = self.table.write().await;
        if table.fail_on_mark {
            return Err(OutboxError::Unavailable("outbox update failed".to_string()));
        }
        let row = table
            .rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(OutboxError::NotFound(id))?;
        row.processed = true;
        Ok(())
    }
}

/// Outbox rows staged by an in-memory transaction, not yet visible.
///
/// Dropping the batch without committing it is a rollback.
#[derive(Debug, Default)]
pub struct OutboxBatch {
    events: Vec<NewOutboxEvent>,
}

impl OutboxBatch {
    /// Returns the number of staged rows.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns true if nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[async_trait]
impl OutboxWriter for OutboxBatch {
    async fn write_event(&mut self, event: NewOutboxEvent) -> Result<()> {
        self.events.push(event);
        Ok(())
    }
}
