//! Key Allocation Errors

use crate::db::{ConnectionError, StoreError, TransactionError};

/// Errors that can occur while allocating a key
#[derive(Debug, thiserror::Error)]
pub enum AllocationError {
    /// Prefix is empty or not ASCII alphanumeric
    #[error("Invalid key prefix: {0:?}")]
    InvalidPrefix(String),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Counter '{0}' cannot be incremented further")]
    CounterOverflow(String),
}

impl AllocationError {
    /// Whether calling `allocate` again may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            AllocationError::Connection(_) | AllocationError::Transaction(_) => true,
            AllocationError::Store(e) => e.is_connection_error(),
            AllocationError::InvalidPrefix(_) | AllocationError::CounterOverflow(_) => false,
        }
    }
}
