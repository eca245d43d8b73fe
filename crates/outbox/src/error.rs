use thiserror::Error;

/// Errors that can occur in the outbox, relay and messaging layers.
#[derive(Debug, Error)]
pub enum OutboxError {
    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The outbox row does not exist.
    #[error("Outbox event not found: {0}")]
    NotFound(i64),

    /// Publishing to the message bus failed.
    #[error("Publish to '{topic}' failed: {reason}")]
    Publish { topic: String, reason: String },

    /// Subscribing to the message bus failed.
    #[error("Subscribe to '{topic}' failed: {reason}")]
    Subscribe { topic: String, reason: String },

    /// The message bus connection could not be established.
    #[error("Message bus connection error: {0}")]
    Connection(String),

    /// A storage backend was unavailable (used by the in-memory store to
    /// simulate database outages).
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Result type for outbox operations.
pub type Result<T> = std::result::Result<T, OutboxError>;
