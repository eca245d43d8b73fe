use async_trait::async_trait;
use common::{CustomerId, Money, OrderId, ProductId};
use outbox::{NewOutboxEvent, OutboxWriter, PostgresOutbox};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};

use super::{Order, OrderItem, OrderStatus, OrderStore, OrderTx, Product};
use crate::{DomainError, Result};

/// PostgreSQL-backed order store.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Creates a new PostgreSQL order store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Returns the outbox table living in the same database.
    pub fn outbox(&self) -> PostgresOutbox {
        PostgresOutbox::new(self.pool.clone())
    }

    /// Runs the order service migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations/order").run(&self.pool).await
    }

    fn row_to_product(row: PgRow) -> Result<Product> {
        Ok(Product {
            id: ProductId::new(row.try_get("id")?),
            name: row.try_get("name")?,
            price: Money::from_cents(row.try_get("price_cents")?),
            stock_quantity: row.try_get::<i32, _>("stock_quantity")?.max(0) as u32,
        })
    }

    fn row_to_item(row: PgRow) -> Result<OrderItem> {
        Ok(OrderItem {
            product_id: ProductId::new(row.try_get("product_id")?),
            quantity: row.try_get::<i32, _>("quantity")?.max(0) as u32,
            price: Money::from_cents(row.try_get("price_cents")?),
        })
    }
}

fn parse_status(raw: &str) -> Result<OrderStatus> {
    raw.parse().map_err(DomainError::Conflict)
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    type Tx = PostgresOrderTx;

    async fn begin(&self) -> Result<PostgresOrderTx> {
        Ok(PostgresOrderTx {
            tx: self.pool.begin().await?,
        })
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        let rows = sqlx::query(
            "SELECT id, name, price_cents, stock_quantity FROM products ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_product).collect()
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let Some(row) = sqlx::query(
            r#"
            SELECT id, customer_id, total_amount_cents, status, created_at
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let items = sqlx::query(
            "SELECT product_id, quantity, price_cents FROM order_items WHERE order_id = $1 ORDER BY id",
        )
        .bind(id.as_i64())
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Self::row_to_item)
        .collect::<Result<Vec<_>>>()?;

        let status: String = row.try_get("status")?;
        Ok(Some(Order {
            id: OrderId::new(row.try_get("id")?),
            customer_id: CustomerId::new(row.try_get("customer_id")?),
            total_amount: Money::from_cents(row.try_get("total_amount_cents")?),
            status: parse_status(&status)?,
            items,
            created_at: row.try_get("created_at")?,
        }))
    }
}

/// Transaction handle of [`PostgresOrderStore`].
pub struct PostgresOrderTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl OutboxWriter for PostgresOrderTx {
    async fn write_event(&mut self, event: NewOutboxEvent) -> outbox::Result<()> {
        PostgresOutbox::insert_event(&mut self.tx, &event).await
    }
}

#[async_trait]
impl OrderTx for PostgresOrderTx {
    async fn product_for_update(&mut self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(
            "SELECT id, name, price_cents, stock_quantity FROM products WHERE id = $1 FOR UPDATE",
        )
        .bind(id.as_i64())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(PostgresOrderStore::row_to_product).transpose()
    }

    async fn decrement_stock(&mut self, id: ProductId, quantity: u32) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE products SET stock_quantity = stock_quantity - $1
            WHERE id = $2 AND stock_quantity >= $1
            "#,
        )
        .bind(quantity as i32)
        .bind(id.as_i64())
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            let available: Option<i32> =
                sqlx::query_scalar("SELECT stock_quantity FROM products WHERE id = $1")
                    .bind(id.as_i64())
                    .fetch_optional(&mut *self.tx)
                    .await?;
            return Err(match available {
                Some(available) => DomainError::InsufficientStock {
                    product_id: id.as_i64(),
                    requested: quantity,
                    available: available.max(0) as u32,
                },
                None => DomainError::not_found("product", id),
            });
        }
        Ok(())
    }

    async fn insert_order(
        &mut self,
        customer_id: CustomerId,
        total_amount: Money,
        items: &[OrderItem],
    ) -> Result<Order> {
        let row = sqlx::query(
            r#"
            INSERT INTO orders (customer_id, total_amount_cents, status)
            VALUES ($1, $2, 'pending')
            RETURNING id, created_at
            "#,
        )
        .bind(customer_id.as_i64())
        .bind(total_amount.cents())
        .fetch_one(&mut *self.tx)
        .await?;

        let id = OrderId::new(row.try_get("id")?);
        for item in items {
            sqlx::query(
                r#"
                INSERT INTO order_items (order_id, product_id, quantity, price_cents)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(id.as_i64())
            .bind(item.product_id.as_i64())
            .bind(item.quantity as i32)
            .bind(item.price.cents())
            .execute(&mut *self.tx)
            .await?;
        }

        Ok(Order {
            id,
            customer_id,
            total_amount,
            status: OrderStatus::Pending,
            items: items.to_vec(),
            created_at: row.try_get("created_at")?,
        })
    }

    async fn status_for_update(&mut self, id: OrderId) -> Result<Option<OrderStatus>> {
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM orders WHERE id = $1 FOR UPDATE")
                .bind(id.as_i64())
                .fetch_optional(&mut *self.tx)
                .await?;

        status.as_deref().map(parse_status).transpose()
    }

    async fn set_status(&mut self, id: OrderId, status: OrderStatus) -> Result<()> {
        sqlx::query("UPDATE orders SET status = $1, updated_at = NOW() WHERE id = $2")
            .bind(status.as_str())
            .bind(id.as_i64())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
