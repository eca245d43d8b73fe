//! Order participant: catalog, stock and the order lifecycle.

mod handler;
mod memory;
mod model;
mod postgres;
mod service;
mod store;

pub use handler::OrderSagaHandler;
pub use memory::{InMemoryOrderStore, InMemoryOrderTx};
pub use model::{Order, OrderItem, OrderLine, OrderStatus, Product};
pub use postgres::{PostgresOrderStore, PostgresOrderTx};
pub use service::OrderService;
pub use store::{OrderStore, OrderTx};
