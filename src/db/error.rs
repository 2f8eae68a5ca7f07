//! Persistence Errors
//!
//! Error types for connection management, transactions and store access.

/// The persistence connection could not be established or closed.
///
/// Cloneable so that a single failed connection attempt can be handed to
/// every caller that was waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    #[error("Failed to connect: {0}")]
    Connect(String),

    #[error("Failed to close connection: {0}")]
    Close(String),
}

/// Begin, commit or rollback failed.
#[derive(Debug, thiserror::Error)]
pub enum TransactionError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("Failed to begin transaction: {0}")]
    Begin(String),

    #[error("Failed to commit transaction: {0}")]
    Commit(String),

    #[error("Failed to roll back transaction: {0}")]
    Rollback(String),
}

/// Errors raised by reads and writes against the store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt value for setting '{key}': {value}")]
    CorruptValue { key: String, value: String },

    #[error("Store error: {0}")]
    Other(String),
}

impl StoreError {
    /// True when the failure came from the connection rather than the data
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            StoreError::Connection(_) | StoreError::Transaction(TransactionError::Connection(_))
        )
    }
}
