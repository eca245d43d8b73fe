use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{CustomerId, Money, OrderId, ProductId};
use outbox::{InMemoryOutbox, NewOutboxEvent, OutboxBatch, OutboxWriter};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{Order, OrderItem, OrderStatus, OrderStore, OrderTx, Product};
use crate::{DomainError, Result};

#[derive(Debug, Clone, Default)]
struct OrderTables {
    products: BTreeMap<ProductId, Product>,
    orders: BTreeMap<OrderId, Order>,
    next_order_id: i64,
    fail_on_insert: bool,
}

/// In-memory order store for tests and single-process runs.
///
/// A transaction holds the table lock for its whole lifetime and works on a
/// private copy of the tables. Commit swaps the copy in and commits the
/// staged outbox rows before the lock is released, so readers never see one
/// without the other.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderStore {
    tables: Arc<Mutex<OrderTables>>,
    outbox: InMemoryOutbox,
}

impl InMemoryOrderStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded with the demo catalog.
    pub fn with_demo_catalog() -> Self {
        let mut tables = OrderTables::default();
        for (id, name, cents, stock) in [
            (1, "Mechanical Keyboard", 4999, 100),
            (2, "Wireless Mouse", 1999, 100),
            (3, "27\" Monitor", 19999, 25),
            (4, "USB-C Cable", 499, 500),
            (5, "Notebook", 999, 1000),
        ] {
            tables.products.insert(
                ProductId::new(id),
                Product {
                    id: ProductId::new(id),
                    name: name.to_string(),
                    price: Money::from_cents(cents),
                    stock_quantity: stock,
                },
            );
        }
        Self {
            tables: Arc::new(Mutex::new(tables)),
            outbox: InMemoryOutbox::new(),
        }
    }

    /// Returns the outbox this store writes to.
    pub fn outbox(&self) -> &InMemoryOutbox {
        &self.outbox
    }

    /// Adds or replaces a product.
    pub async fn upsert_product(&self, product: Product) {
        self.tables.lock().await.products.insert(product.id, product);
    }

    /// Returns the number of committed orders.
    pub async fn order_count(&self) -> usize {
        self.tables.lock().await.orders.len()
    }

    /// Makes `insert_order` fail, simulating a database error mid-transaction.
    pub async fn set_fail_on_insert(&self, fail: bool) {
        self.tables.lock().await.fail_on_insert = fail;
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    type Tx = InMemoryOrderTx;

    async fn begin(&self) -> Result<InMemoryOrderTx> {
        let guard = self.tables.clone().lock_owned().await;
        let working = guard.clone();
        Ok(InMemoryOrderTx {
            guard,
            working,
            batch: self.outbox.begin(),
            outbox: self.outbox.clone(),
        })
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        Ok(self.tables.lock().await.products.values().cloned().collect())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.tables.lock().await.orders.get(&id).cloned())
    }
}

/// Transaction handle of [`InMemoryOrderStore`].
pub struct InMemoryOrderTx {
    guard: OwnedMutexGuard<OrderTables>,
    working: OrderTables,
    batch: OutboxBatch,
    outbox: InMemoryOutbox,
}

impl InMemoryOrderTx {
    fn order_mut(&mut self, id: OrderId) -> Result<&mut Order> {
        self.working
            .orders
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found("order", id))
    }
}

#[async_trait]
impl OutboxWriter for InMemoryOrderTx {
    async fn write_event(&mut self, event: NewOutboxEvent) -> outbox::Result<()> {
        self.batch.write_event(event).await
    }
}

#[async_trait]
impl OrderTx for InMemoryOrderTx {
    async fn product_for_update(&mut self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.working.products.get(&id).cloned())
    }

    async fn decrement_stock(&mut self, id: ProductId, quantity: u32) -> Result<()> {
        let product = self
            .working
            .products
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found("product", id))?;
        product.stock_quantity = product.stock_quantity.checked_sub(quantity).ok_or(
            DomainError::InsufficientStock {
                product_id: id.as_i64(),
                requested: quantity,
                available: product.stock_quantity,
            },
        )?;
        Ok(())
    }

    async fn insert_order(
        &mut self,
        customer_id: CustomerId,
        total_amount: Money,
        items: &[OrderItem],
    ) -> Result<Order> {
        if self.working.fail_on_insert {
            return Err(DomainError::Unavailable("order insert failed".to_string()));
        }
        self.working.next_order_id += 1;
        let order = Order {
            id: OrderId::new(self.working.next_order_id),
            customer_id,
            total_amount,
            status: OrderStatus::Pending,
            items: items.to_vec(),
            created_at: Utc::now(),
        };
        self.working.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn status_for_update(&mut self, id: OrderId) -> Result<Option<OrderStatus>> {
        Ok(self.working.orders.get(&id).map(|o| o.status))
    }

    async fn set_status(&mut self, id: OrderId, status: OrderStatus) -> Result<()> {
        self.order_mut(id)?.status = status;
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        let InMemoryOrderTx {
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
