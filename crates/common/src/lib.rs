//! Shared types for the order saga services.
//!
//! Identifiers, the `Money` value object and the messaging topic names are
//! used by every participant and by the orchestrator, so they live here.

pub mod money;
pub mod topics;
pub mod types;

pub use money::Money;
pub use types::{CustomerId, OrderId, ProductId, SalesId, VoucherId, WorkflowId};
