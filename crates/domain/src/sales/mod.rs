//! Sales participant: vouchers, discounting and sales transactions.

mod handler;
mod memory;
mod model;
mod postgres;
mod service;
mod store;

pub use handler::SalesSagaHandler;
pub use memory::{InMemorySalesStore, InMemorySalesTx};
pub use model::{NewVoucher, Pricing, ProcessSale, SalesStatus, SalesTransaction, Voucher};
pub use postgres::{PostgresSalesStore, PostgresSalesTx};
pub use service::SalesService;
pub use store::{SalesStore, SalesTx};
