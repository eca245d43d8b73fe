use async_trait::async_trait;
use common::{CustomerId, Money, OrderId, SalesId, VoucherId};
use outbox::{NewOutboxEvent, OutboxWriter, PostgresOutbox};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};

use super::{NewVoucher, Pricing, SalesStatus, SalesStore, SalesTransaction, SalesTx, Voucher};
use crate::{DomainError, Result};

const TRANSACTION_COLUMNS: &str = r#"
    st.id, st.order_id, st.customer_id, st.voucher_id, v.code AS voucher_code,
    st.original_amount_cents, st.discount_amount_cents, st.final_amount_cents,
    st.status, st.created_at
"#;

/// PostgreSQL-backed sales store.
#[derive(Clone)]
pub struct PostgresSalesStore {
    pool: PgPool,
}

impl PostgresSalesStore {
    /// Creates a new PostgreSQL sales store.
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

    /// Runs the sales service migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations/sales").run(&self.pool).await
    }

    fn row_to_voucher(row: PgRow) -> Result<Voucher> {
        Ok(Voucher {
            id: VoucherId::new(row.try_get("id")?),
            code: row.try_get("code")?,
            discount_percent: row.try_get("discount_percent")?,
            max_discount: row
                .try_get::<Option<i64>, _>("max_discount_cents")?
                .map(Money::from_cents),
            is_active: row.try_get("is_active")?,
        })
    }

    fn row_to_transaction(row: PgRow) -> Result<SalesTransaction> {
        let status: String = row.try_get("status")?;
        Ok(SalesTransaction {
            id: SalesId::new(row.try_get("id")?),
            order_id: OrderId::new(row.try_get("order_id")?),
            customer_id: CustomerId::new(row.try_get("customer_id")?),
            voucher_id: row.try_get::<Option<i64>, _>("voucher_id")?.map(VoucherId::new),
            voucher_code: row.try_get("voucher_code")?,
            original_amount: Money::from_cents(row.try_get("original_amount_cents")?),
            discount_amount: Money::from_cents(row.try_get("discount_amount_cents")?),
            final_amount: Money::from_cents(row.try_get("final_amount_cents")?),
            status: status.parse().map_err(DomainError::Conflict)?,
            created_at: row.try_get("created_at")?,
        })
    }
}

fn unique_violation(e: sqlx::Error, duplicate: impl FnOnce() -> DomainError) -> DomainError {
    match &e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => duplicate(),
        _ => DomainError::Database(e),
    }
}

#[async_trait]
impl SalesStore for PostgresSalesStore {
    type Tx = PostgresSalesTx;

    async fn begin(&self) -> Result<PostgresSalesTx> {
        Ok(PostgresSalesTx {
            tx: self.pool.begin().await?,
        })
    }

    async fn list_active_vouchers(&self) -> Result<Vec<Voucher>> {
        let rows = sqlx::query(
            r#"
            SELECT id, code, discount_percent, max_discount_cents, is_active
            FROM vouchers
            WHERE is_active = true
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_voucher).collect()
    }

    async fn insert_voucher(&self, voucher: NewVoucher) -> Result<Voucher> {
        let row = sqlx::query(
            r#"
            INSERT INTO vouchers (code, discount_percent, max_discount_cents)
            VALUES ($1, $2, $3)
            RETURNING id, code, discount_percent, max_discount_cents, is_active
            "#,
        )
        .bind(&voucher.code)
        .bind(voucher.discount_percent)
        .bind(voucher.max_discount.map(|m| m.cents()))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            unique_violation(e, || {
                DomainError::Conflict(format!("voucher code '{}' already exists", voucher.code))
            })
        })?;

        Self::row_to_voucher(row)
    }

    async fn get_by_order(&self, order_id: OrderId) -> Result<Option<SalesTransaction>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS}
            FROM sales_transactions st
            LEFT JOIN vouchers v ON st.voucher_id = v.id
            WHERE st.order_id = $1
            "#
        ))
        .bind(order_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_transaction).transpose()
    }
}

/// Transaction handle of [`PostgresSalesStore`].
pub struct PostgresSalesTx {
    tx: Transaction<'static, Postgres>,
}

impl PostgresSalesTx {
    async fn fetch_locked(&mut self, column: &str, value: i64) -> Result<Option<SalesTransaction>> {
        // Lock the row first; FOR UPDATE cannot apply to the nullable side of the join.
        let id: Option<i64> = sqlx::query_scalar(&format!(
            "SELECT id FROM sales_transactions WHERE {column} = $1 FOR UPDATE"
        ))
        .bind(value)
        .fetch_optional(&mut *self.tx)
        .await?;

        let Some(id) = id else {
            return Ok(None);
        };
        self.fetch(SalesId::new(id)).await.map(Some)
    }

    async fn fetch(&mut self, id: SalesId) -> Result<SalesTransaction> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS}
            FROM sales_transactions st
            LEFT JOIN vouchers v ON st.voucher_id = v.id
            WHERE st.id = $1
            "#
        ))
        .bind(id.as_i64())
        .fetch_one(&mut *self.tx)
        .await?;

        PostgresSalesStore::row_to_transaction(row)
    }
}

#[async_trait]
impl OutboxWriter for PostgresSalesTx {
    async fn write_event(&mut self, event: NewOutboxEvent) -> outbox::Result<()> {
        PostgresOutbox::insert_event(&mut self.tx, &event).await
    }
}

#[async_trait]
impl SalesTx for PostgresSalesTx {
    async fn active_voucher(&mut self, code: &str) -> Result<Option<Voucher>> {
        let row = sqlx::query(
            r#"
            SELECT id, code, discount_percent, max_discount_cents, is_active
            FROM vouchers
            WHERE code = $1 AND is_active = true
            "#,
        )
        .bind(code)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(PostgresSalesStore::row_to_voucher).transpose()
    }

    async fn by_order_for_update(&mut self, order_id: OrderId) -> Result<Option<SalesTransaction>> {
        self.fetch_locked("order_id", order_id.as_i64()).await
    }

    async fn by_id_for_update(&mut self, id: SalesId) -> Result<Option<SalesTransaction>> {
        self.fetch_locked("id", id.as_i64()).await
    }

    async fn insert_transaction(
        &mut self,
        order_id: OrderId,
        customer_id: CustomerId,
        pricing: &Pricing,
        status: SalesStatus,
    ) -> Result<SalesTransaction> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO sales_transactions
                (order_id, customer_id, voucher_id, original_amount_cents,
                 discount_amount_cents, final_amount_cents, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(order_id.as_i64())
        .bind(customer_id.as_i64())
        .bind(pricing.voucher.as_ref().map(|v| v.id.as_i64()))
        .bind(pricing.original_amount.cents())
        .bind(pricing.discount_amount.cents())
        .bind(pricing.final_amount.cents())
        .bind(status.as_str())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| unique_violation(e, || DomainError::DuplicateSale(order_id)))?;

        self.fetch(SalesId::new(id)).await
    }

    async fn update_transaction(
        &mut self,
        id: SalesId,
        pricing: &Pricing,
        status: SalesStatus,
    ) -> Result<SalesTransaction> {
        sqlx::query(
            r#"
            UPDATE sales_transactions
            SET voucher_id = $1, original_amount_cents = $2, discount_amount_cents = $3,
                final_amount_cents = $4, status = $5, updated_at = NOW()
            WHERE id = $6
            "#,
        )
        .bind(pricing.voucher.as_ref().map(|v| v.id.as_i64()))
        .bind(pricing.original_amount.cents())
        .bind(pricing.discount_amount.cents())
        .bind(pricing.final_amount.cents())
        .bind(status.as_str())
        .bind(id.as_i64())
        .execute(&mut *self.tx)
        .await?;

        self.fetch(id).await
    }

    async fn set_status(&mut self, id: SalesId, status: SalesStatus) -> Result<()> {
        sqlx::query("UPDATE sales_transactions SET status = $1, updated_at = NOW() WHERE id = $2")
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
