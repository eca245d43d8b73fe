use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{CustomerId, Money, OrderId, SalesId, VoucherId};
use outbox::{InMemoryOutbox, NewOutboxEvent, OutboxBatch, OutboxWriter};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{NewVoucher, Pricing, SalesStatus, SalesStore, SalesTransaction, SalesTx, Voucher};
use crate::{DomainError, Result};

#[derive(Debug, Clone, Default)]
struct SalesTables {
    vouchers: BTreeMap<VoucherId, Voucher>,
    transactions: BTreeMap<SalesId, SalesTransaction>,
    next_voucher_id: i64,
    next_sales_id: i64,
    fail_on_write: bool,
    race_on_insert: bool,
}

impl SalesTables {
    fn add_voucher(&mut self, voucher: NewVoucher) -> Voucher {
        self.next_voucher_id += 1;
        let voucher = Voucher {
            id: VoucherId::new(self.next_voucher_id),
            code: voucher.code,
            discount_percent: voucher.discount_percent,
            max_discount: voucher.max_discount,
            is_active: true,
        };
        self.vouchers.insert(voucher.id, voucher.clone());
        voucher
    }

    fn new_transaction(
        &mut self,
        order_id: OrderId,
        customer_id: CustomerId,
        pricing: &Pricing,
        status: SalesStatus,
    ) -> SalesTransaction {
        self.next_sales_id += 1;
        let transaction = SalesTransaction {
            id: SalesId::new(self.next_sales_id),
            order_id,
            customer_id,
            voucher_id: pricing.voucher.as_ref().map(|v| v.id),
            voucher_code: pricing.voucher.as_ref().map(|v| v.code.clone()),
            original_amount: pricing.original_amount,
            discount_amount: pricing.discount_amount,
            final_amount: pricing.final_amount,
            status,
            created_at: Utc::now(),
        };
        self.transactions.insert(transaction.id, transaction.clone());
        transaction
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_on_write {
            return Err(DomainError::Unavailable("sales write failed".to_string()));
        }
        Ok(())
    }
}

/// In-memory sales store; transactions work like [`crate::order::InMemoryOrderStore`]'s.
#[derive(Debug, Clone, Default)]
pub struct InMemorySalesStore {
    tables: Arc<Mutex<SalesTables>>,
    outbox: InMemoryOutbox,
}

impl InMemorySalesStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded with the demo vouchers.
    pub fn with_demo_vouchers() -> Self {
        let mut tables = SalesTables::default();
        tables.add_voucher(NewVoucher {
            code: "SAVE10".to_string(),
            discount_percent: 10.0,
            max_discount: Some(Money::from_cents(5000)),
        });
        tables.add_voucher(NewVoucher {
            code: "WELCOME20".to_string(),
            discount_percent: 20.0,
            max_discount: Some(Money::from_cents(2000)),
        });
        Self {
            tables: Arc::new(Mutex::new(tables)),
            outbox: InMemoryOutbox::new(),
        }
    }

    /// Returns the outbox this store writes to.
    pub fn outbox(&self) -> &InMemoryOutbox {
        &self.outbox
    }

    /// Returns the number of committed sales transactions.
    pub async fn transaction_count(&self) -> usize {
        self.tables.lock().await.transactions.len()
    }

    /// Makes every transaction insert or update fail, simulating a database error.
    pub async fn set_fail_on_write(&self, fail: bool) {
        self.tables.lock().await.fail_on_write = fail;
    }

    /// Makes the next transaction insert lose a race: a pending transaction
    /// for the same order is committed underneath it and the insert fails
    /// with [`DomainError::DuplicateSale`], as the unique key on `order_id`
    /// does in PostgreSQL.
    pub async fn set_race_on_insert(&self, race: bool) {
        self.tables.lock().await.race_on_insert = race;
    }
}

#[async_trait]
impl SalesStore for InMemorySalesStore {
    type Tx = InMemorySalesTx;

    async fn begin(&self) -> Result<InMemorySalesTx> {
        let guard = self.tables.clone().lock_owned().await;
        let working = guard.clone();
        Ok(InMemorySalesTx {
            guard,
            working,
            batch: self.outbox.begin(),
            outbox: self.outbox.clone(),
        })
    }

    async fn list_active_vouchers(&self) -> Result<Vec<Voucher>> {
        Ok(self
            .tables
            .lock()
            .await
            .vouchers
            .values()
            .filter(|v| v.is_active)
            .cloned()
            .collect())
    }

    async fn insert_voucher(&self, voucher: NewVoucher) -> Result<Voucher> {
        let mut tables = self.tables.lock().await;
        if tables.vouchers.values().any(|v| v.code == voucher.code) {
            return Err(DomainError::Conflict(format!(
                "voucher code '{}' already exists",
                voucher.code
            )));
        }
        Ok(tables.add_voucher(voucher))
    }

    async fn get_by_order(&self, order_id: OrderId) -> Result<Option<SalesTransaction>> {
        Ok(self
            .tables
            .lock()
            .await
            .transactions
            .values()
            .find(|t| t.order_id == order_id)
            .cloned())
    }
}

/// Transaction handle of [`InMemorySalesStore`].
pub struct InMemorySalesTx {
    guard: OwnedMutexGuard<SalesTables>,
    working: SalesTables,
    batch: OutboxBatch,
    outbox: InMemoryOutbox,
}

impl InMemorySalesTx {
    fn transaction_mut(&mut self, id: SalesId) -> Result<&mut SalesTransaction> {
        self.working
            .transactions
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found("sales transaction", id))
    }
}

#[async_trait]
impl OutboxWriter for InMemorySalesTx {
    async fn write_event(&mut self, event: NewOutboxEvent) -> outbox::Result<()> {
        self.batch.write_event(event).await
    }
}

#[async_trait]
impl SalesTx for InMemorySalesTx {
    async fn active_voucher(&mut self, code: &str) -> Result<Option<Voucher>> {
        Ok(self
            .working
            .vouchers
            .values()
            .find(|v| v.is_active && v.code == code)
            .cloned())
    }

    async fn by_order_for_update(&mut self, order_id: OrderId) -> Result<Option<SalesTransaction>> {
        Ok(self
            .working
            .transactions
            .values()
            .find(|t| t.order_id == order_id)
            .cloned())
    }

    async fn by_id_for_update(&mut self, id: SalesId) -> Result<Option<SalesTransaction>> {
        Ok(self.working.transactions.get(&id).cloned())
    }

    async fn insert_transaction(
        &mut self,
        order_id: OrderId,
        customer_id: CustomerId,
        pricing: &Pricing,
        status: SalesStatus,
    ) -> Result<SalesTransaction> {
        self.working.check_writable()?;
        if self.working.race_on_insert {
            self.guard.race_on_insert = false;
            self.guard
                .new_transaction(order_id, customer_id, pricing, SalesStatus::Pending);
            return Err(DomainError::DuplicateSale(order_id));
        }
        if self.working.transactions.values().any(|t| t.order_id == order_id) {
            return Err(DomainError::DuplicateSale(order_id));
        }

        let transaction = self
            .working
            .new_transaction(order_id, customer_id, pricing, status);
        Ok(transaction)
    }

    async fn update_transaction(
        &mut self,
        id: SalesId,
        pricing: &Pricing,
        status: SalesStatus,
    ) -> Result<SalesTransaction> {
        self.working.check_writable()?;
        let transaction = self.transaction_mut(id)?;
        transaction.voucher_id = pricing.voucher.as_ref().map(|v| v.id);
        transaction.voucher_code = pricing.voucher.as_ref().map(|v| v.code.clone());
        transaction.original_amount = pricing.original_amount;
        transaction.discount_amount = pricing.discount_amount;
        transaction.final_amount = pricing.final_amount;
        transaction.status = status;
        Ok(transaction.clone())
    }

    async fn set_status(&mut self, id: SalesId, status: SalesStatus) -> Result<()> {
        self.working.check_writable()?;
        self.transaction_mut(id)?.status = status;
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        let InMemorySalesTx {
            mut guard,
            working,
            batch,
            outbox,
        } = self;
        *guard = working;
        outbox.commit(batch).await;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}
