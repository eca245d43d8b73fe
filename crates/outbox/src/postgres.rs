use async_trait::async_trait;
use sqlx::{PgConnection, PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{EventId, NewOutboxEvent, OutboxEvent, OutboxStore, Result};

/// PostgreSQL-backed outbox table (`outbox_events`).
#[derive(Clone)]
pub struct PostgresOutbox {
    pool: PgPool,
}

impl PostgresOutbox {
    /// Creates a new PostgreSQL outbox.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Inserts an outbox row on an open connection, normally the one
    /// owned by a participant's transaction.
    pub async fn insert_event(conn: &mut PgConnection, event: &NewOutboxEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO outbox_events (event_id, event_type, aggregate_id, event_data)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(event.event_id.as_uuid())
        .bind(&event.event_type)
        .bind(event.aggregate_id)
        .bind(&event.payload)
        .execute(conn)
        .await?;

        Ok(())
    }

    fn row_to_event(row: PgRow) -> Result<OutboxEvent> {
        Ok(OutboxEvent {
            id: row.try_get("id")?,
            event_id: EventId::from_uuid(row.try_get::<Uuid, _>("event_id")?),
            event_type: row.try_get("event_type")?,
            aggregate_id: row.try_get("aggregate_id")?,
            payload: row.try_get("event_data")?,
            processed: row.try_get("processed")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl OutboxStore for PostgresOutbox {
    async fn fetch_unprocessed(&self) -> Result<Vec<OutboxEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT id, event_id, event_type, aggregate_id, event_data, processed, created_at
            FROM outbox_events
            WHERE processed = false
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn mark_processed(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE outbox_events SET processed = true WHERE id = $1 AND processed = false")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
