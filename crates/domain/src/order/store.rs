use async_trait::async_trait;
use common::{CustomerId, Money, OrderId, ProductId};
use outbox::OutboxWriter;

use super::{Order, OrderItem, OrderStatus, Product};
use crate::Result;

/// Storage for the order participant.
///
/// Reads outside a transaction only ever see committed state. Every
/// mutation goes through an [`OrderTx`].
#[async_trait]
pub trait OrderStore: Send + Sync + 'static {
    type Tx: OrderTx;

    /// Opens a local transaction.
    async fn begin(&self) -> Result<Self::Tx>;

    /// Returns the whole catalog ordered by id.
    async fn list_products(&self) -> Result<Vec<Product>>;

    /// Loads an order with its items.
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;
}

/// An open local transaction on the order tables.
///
/// Outbox rows written through the [`OutboxWriter`] supertrait commit or
/// roll back together with everything else done here. Dropping the
/// transaction without committing rolls it back.
#[async_trait]
pub trait OrderTx: OutboxWriter + Send {
    /// Loads a product, locking its row for the rest of the transaction.
    async fn product_for_update(&mut self, id: ProductId) -> Result<Option<Product>>;

    /// Subtracts `quantity` from a product's stock.
    async fn decrement_stock(&mut self, id: ProductId, quantity: u32) -> Result<()>;

    /// Inserts a pending order with its items and returns it.
    async fn insert_order(
        &mut self,
        customer_id: CustomerId,
        total_amount: Money,
        items: &[OrderItem],
    ) -> Result<Order>;

    /// Loads an order's status, locking its row for the rest of the transaction.
    async fn status_for_update(&mut self, id: OrderId) -> Result<Option<OrderStatus>>;

    /// Overwrites an order's status.
    async fn set_status(&mut self, id: OrderId, status: OrderStatus) -> Result<()>;

    /// Makes every change of the transaction visible at once.
    async fn commit(self) -> Result<()>;

    /// Discards every change of the transaction.
    async fn rollback(self) -> Result<()>;
}
