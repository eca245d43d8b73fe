//! PostgreSQL integration tests for the order and sales participants.
//!
//! These tests share one PostgreSQL container and need Docker. Run with:
//!
//! ```bash
//! cargo test -p domain --test postgres_integration -- --ignored --test-threads=1
//! ```

use std::sync::Arc;

use common::{CustomerId, Money, OrderId};
use domain::{
    DomainError, OrderLine, OrderService, OrderStatus, PostgresOrderStore, PostgresSalesStore,
    ProcessSale, SalesSagaHandler, SalesService, SalesStatus,
    order::{OrderStore, OrderTx},
};
use outbox::{
    EventPayload, NewOutboxEvent, OrderCreatedData, OutboxStore, OutboxWriter, SagaEvent,
    SagaEventHandler,
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

            // Both participants share one database here; the outbox DDL is idempotent.
            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            for script in [
                include_str!("../../../migrations/order/0001_create_order_tables.sql"),
                include_str!("../../../migrations/sales/0001_create_sales_tables.sql"),
            ] {
                sqlx::raw_sql(script).execute(&temp_pool).await.unwrap();
            }
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Fresh pool with cleared tables and reseeded catalog and vouchers.
async fn get_test_pool() -> PgPool {
    let info = get_container_info().await;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::raw_sql(
        "TRUNCATE TABLE order_items, orders, products, sales_transactions, vouchers, outbox_events RESTART IDENTITY CASCADE",
    )
    .execute(&pool)
    .await
    .unwrap();
    for script in [
        include_str!("../../../migrations/order/0002_seed_catalog.sql"),
        include_str!("../../../migrations/sales/0002_seed_vouchers.sql"),
    ] {
        sqlx::raw_sql(script).execute(&pool).await.unwrap();
    }

    pool
}

async fn count(pool: &PgPool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn rollback_after_outbox_insert_leaves_no_rows() {
    let pool = get_test_pool().await;
    let store = PostgresOrderStore::new(pool.clone());

    let mut tx = store.begin().await.unwrap();
    let order = tx
        .insert_order(CustomerId::new(1), Money::from_cents(999), &[])
        .await
        .unwrap();
    let payload = EventPayload::OrderCreated(OrderCreatedData {
        customer_id: CustomerId::new(1),
        total_amount: Money::from_cents(999),
    });
    tx.write_event(NewOutboxEvent::new(order.id, &payload).unwrap())
        .await
        .unwrap();
    tx.rollback().await.unwrap();

    assert_eq!(count(&pool, "orders").await, 0);
    assert_eq!(count(&pool, "outbox_events").await, 0);
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn create_order_commits_order_stock_and_event() {
    let pool = get_test_pool().await;
    let service = OrderService::new(PostgresOrderStore::new(pool.clone()));

    let order = service
        .create_order(CustomerId::new(1), &[OrderLine::new(5, 2)])
        .await
        .unwrap();

    assert_eq!(order.total_amount, Money::from_cents(1998));
    let loaded = service.get_order(order.id).await.unwrap();
    assert_eq!(loaded.items.len(), 1);
    assert_eq!(loaded.status, OrderStatus::Pending);

    let stock: i32 = sqlx::query_scalar("SELECT stock_quantity FROM products WHERE id = 5")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(stock, 998);

    let rows = service.store().outbox().fetch_unprocessed().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].event_type, "ORDER_CREATED");
    assert_eq!(rows[0].aggregate_id, order.id.as_i64());
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn insufficient_stock_rolls_back_everything() {
    let pool = get_test_pool().await;
    let service = OrderService::new(PostgresOrderStore::new(pool.clone()));

    let err = service
        .create_order(
            CustomerId::new(1),
            &[OrderLine::new(5, 1), OrderLine::new(3, 1000)],
        )
        .await
        .unwrap_err();

    assert!(matches!(err, DomainError::InsufficientStock { .. }));
    assert_eq!(count(&pool, "orders").await, 0);
    assert_eq!(count(&pool, "outbox_events").await, 0);
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn cancelled_order_cannot_be_completed() {
    let pool = get_test_pool().await;
    let service = OrderService::new(PostgresOrderStore::new(pool));
    let order = service
        .create_order(CustomerId::new(1), &[OrderLine::new(1, 1)])
        .await
        .unwrap();

    service
        .update_status(order.id, OrderStatus::Cancelled)
        .await
        .unwrap();
    let err = service
        .update_status(order.id, OrderStatus::Completed)
        .await
        .unwrap_err();

    assert!(matches!(err, DomainError::InvalidTransition { .. }));
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn sale_with_voucher_then_reverse() {
    let pool = get_test_pool().await;
    let service = SalesService::new(PostgresSalesStore::new(pool.clone()));

    let sale = service
        .process_sale(&ProcessSale {
            order_id: OrderId::new(42),
            customer_id: CustomerId::new(1),
            original_amount: Money::from_cents(1998),
            voucher_code: Some("SAVE10".to_string()),
        })
        .await
        .unwrap();
    assert_eq!(sale.final_amount, Money::from_cents(1798));
    assert_eq!(sale.voucher_code.as_deref(), Some("SAVE10"));

    let reversed = service.reverse_sale(sale.id).await.unwrap();
    assert_eq!(reversed.status, SalesStatus::Reversed);
    assert_eq!(
        service.get_by_order(OrderId::new(42)).await.unwrap().status,
        SalesStatus::Reversed
    );

    let types: Vec<String> = service
        .store()
        .outbox()
        .fetch_unprocessed()
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.event_type)
        .collect();
    assert_eq!(
        types,
        vec!["SALES_TRANSACTION_COMPLETED", "SALES_TRANSACTION_REVERSED"]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
#[ignore = "requires Docker"]
async fn charge_and_order_created_race_settles_on_one_completed_sale() {
    let pool = get_test_pool().await;
    let service = SalesService::new(PostgresSalesStore::new(pool.clone()));
    let handler = Arc::new(SalesSagaHandler::new(service.clone()));

    for order_id in 1..=20_i64 {
        let event = SagaEvent::new(
            order_id,
            EventPayload::OrderCreated(OrderCreatedData {
                customer_id: CustomerId::new(1),
                total_amount: Money::from_cents(1998),
            }),
        );
        let request = ProcessSale {
            order_id: OrderId::new(order_id),
            customer_id: CustomerId::new(1),
            original_amount: Money::from_cents(1998),
            voucher_code: Some("SAVE10".to_string()),
        };

        let handler = handler.clone();
        let created = tokio::spawn(async move { handler.handle(&event).await });
        let sales = service.clone();
        let charged = tokio::spawn(async move { sales.process_sale(&request).await });

        created.await.unwrap().unwrap();
        let sale = charged.await.unwrap().unwrap();
        assert_eq!(sale.status, SalesStatus::Completed);
        assert_eq!(sale.final_amount, Money::from_cents(1798));
        assert_eq!(
            service.get_by_order(OrderId::new(order_id)).await.unwrap().status,
            SalesStatus::Completed
        );
    }

    assert_eq!(count(&pool, "sales_transactions").await, 20);
    let failed: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM outbox_events WHERE event_type = 'SALES_TRANSACTION_FAILED'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(failed, 0);
}
