//! Saga participant domains.
//!
//! - [`order`]: catalog, stock and the order lifecycle
//! - [`sales`]: vouchers, discounting and sales transactions
//!
//! Each participant owns its storage and writes the event announcing a
//! state change through the transactional outbox, in the same local
//! transaction as the change itself.

pub mod error;
pub mod order;
pub mod sales;

pub use error::{DomainError, Result};
pub use order::{
    InMemoryOrderStore, Order, OrderItem, OrderLine, OrderSagaHandler, OrderService, OrderStatus,
    OrderStore, PostgresOrderStore, Product,
};
pub use sales::{
    InMemorySalesStore, NewVoucher, PostgresSalesStore, ProcessSale, SalesSagaHandler,
    SalesService, SalesStatus, SalesStore, SalesTransaction, Voucher,
};
