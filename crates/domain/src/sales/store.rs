use async_trait::async_trait;
use common::{CustomerId, OrderId, SalesId};
use outbox::OutboxWriter;

use super::{NewVoucher, Pricing, SalesStatus, SalesTransaction, Voucher};
use crate::Result;

/// Storage for the sales participant.
#[async_trait]
pub trait SalesStore: Send + Sync + 'static {
    type Tx: SalesTx;

    /// Opens a local transaction.
    async fn begin(&self) -> Result<Self::Tx>;

    /// Returns all active vouchers ordered by id.
    async fn list_active_vouchers(&self) -> Result<Vec<Voucher>>;

    /// Stores a new active voucher. A duplicate code is a conflict.
    async fn insert_voucher(&self, voucher: NewVoucher) -> Result<Voucher>;

    /// Loads the sales transaction of an order.
    async fn get_by_order(&self, order_id: OrderId) -> Result<Option<SalesTransaction>>;
}

/// An open local transaction on the sales tables.
///
/// Dropping the transaction without committing rolls it back.
#[async_trait]
pub trait SalesTx: OutboxWriter + Send {
    /// Looks up an active voucher by code.
    async fn active_voucher(&mut self, code: &str) -> Result<Option<Voucher>>;

    /// Loads an order's sales transaction, locking it for the rest of the transaction.
    async fn by_order_for_update(&mut self, order_id: OrderId) -> Result<Option<SalesTransaction>>;

    /// Loads a sales transaction, locking it for the rest of the transaction.
    async fn by_id_for_update(&mut self, id: SalesId) -> Result<Option<SalesTransaction>>;

    /// Inserts a sales transaction and returns it.
    async fn insert_transaction(
        &mut self,
        order_id: OrderId,
        customer_id: CustomerId,
        pricing: &Pricing,
        status: SalesStatus,
    ) -> Result<SalesTransaction>;

    /// Re-prices an existing transaction and sets its status.
    async fn update_transaction(
        &mut self,
        id: SalesId,
        pricing: &Pricing,
        status: SalesStatus,
    ) -> Result<SalesTransaction>;

    /// Sets a transaction's status.
    async fn set_status(&mut self, id: SalesId, status: SalesStatus) -> Result<()>;

    async fn commit(self) -> Result<()>;

    async fn rollback(self) -> Result<()>;
}
