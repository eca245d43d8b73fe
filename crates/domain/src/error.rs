//! Domain error types.

use common::OrderId;
use outbox::OutboxError;
use thiserror::Error;

/// Errors that can occur during participant operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Input rejected before any state was touched.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Not enough stock to fulfil a line item.
    #[error("insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: i64,
        requested: u32,
        available: u32,
    },

    /// The requested status change is not allowed from the current status.
    #[error("cannot move {entity} {id} from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        id: i64,
        from: String,
        to: String,
    },

    /// The operation conflicts with existing state (duplicate key, reversed sale).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The order already has a sales transaction.
    #[error("order {0} already has a sales transaction")]
    DuplicateSale(OrderId),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Writing to the outbox failed.
    #[error("Outbox error: {0}")]
    Outbox(#[from] OutboxError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Storage was unavailable (simulated by the in-memory stores).
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl DomainError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        DomainError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;
