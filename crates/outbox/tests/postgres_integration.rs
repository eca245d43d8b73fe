//! PostgreSQL integration tests for the outbox table and relay.
//!
//! These tests share one PostgreSQL container and need Docker. Run with:
//!
//! ```bash
//! cargo test -p outbox --test postgres_integration -- --ignored --test-threads=1
//! ```

use std::sync::Arc;

use outbox::{
    EventPayload, InMemoryMessageBus, NewOutboxEvent, OutboxRelay, OutboxStore, PostgresOutbox,
    RelayConfig, SalesFailedData,
};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();
            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();
            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/order/0001_create_order_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

async fn get_test_outbox() -> PostgresOutbox {
    let info = get_container_info().await;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE outbox_events")
        .execute(&pool)
        .await
        .unwrap();

    PostgresOutbox::new(pool)
}

fn failure_event(aggregate_id: i64) -> NewOutboxEvent {
    NewOutboxEvent::new(
        aggregate_id,
        &EventPayload::SalesTransactionFailed(SalesFailedData {
            error: format!("order {aggregate_id} declined"),
        }),
    )
    .unwrap()
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn rolled_back_insert_leaves_no_row() {
    let outbox = get_test_outbox().await;

    let mut tx = outbox.pool().begin().await.unwrap();
    PostgresOutbox::insert_event(&mut tx, &failure_event(1))
        .await
        .unwrap();
    tx.rollback().await.unwrap();

    assert!(outbox.fetch_unprocessed().await.unwrap().is_empty());
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn committed_rows_come_back_in_creation_order() {
    let outbox = get_test_outbox().await;

    for id in [3, 1, 2] {
        let mut tx = outbox.pool().begin().await.unwrap();
        PostgresOutbox::insert_event(&mut tx, &failure_event(id))
            .await
            .unwrap();
        tx.commit().await.unwrap();
    }

    let rows = outbox.fetch_unprocessed().await.unwrap();
    let aggregates: Vec<i64> = rows.iter().map(|r| r.aggregate_id).collect();
    assert_eq!(aggregates, vec![3, 1, 2]);
    assert!(rows.iter().all(|r| !r.processed));
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn duplicate_event_id_is_ignored() {
    let outbox = get_test_outbox().await;
    let event = failure_event(1);

    let mut tx = outbox.pool().begin().await.unwrap();
    PostgresOutbox::insert_event(&mut tx, &event).await.unwrap();
    PostgresOutbox::insert_event(&mut tx, &event).await.unwrap();
    tx.commit().await.unwrap();

    assert_eq!(outbox.fetch_unprocessed().await.unwrap().len(), 1);
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn relay_marks_published_rows_processed() {
    let outbox = get_test_outbox().await;
    let mut tx = outbox.pool().begin().await.unwrap();
    PostgresOutbox::insert_event(&mut tx, &failure_event(7))
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let bus = InMemoryMessageBus::with_recording();
    let relay = OutboxRelay::new(
        outbox.clone(),
        Arc::new(bus.clone()),
        RelayConfig::for_topic("saga_responses"),
    );

    assert_eq!(relay.run_once().await.unwrap(), 1);
    assert_eq!(relay.run_once().await.unwrap(), 0);

    let published = bus.published_events("saga_responses").await;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].aggregate_id, 7);

    let processed: bool = sqlx::query_scalar("SELECT processed FROM outbox_events LIMIT 1")
        .fetch_one(outbox.pool())
        .await
        .unwrap();
    assert!(processed);
}
