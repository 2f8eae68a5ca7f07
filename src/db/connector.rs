//! Connector abstraction
//!
//! A `Connector` knows how to open and close one persistence connection and
//! how to run transactions over it. The `ConnectionManager` owns the
//! lifecycle; connectors only perform the I/O.

use async_trait::async_trait;

use super::{ConnectionError, TransactionError};

#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Shared handle to an established connection
    type Connection: Clone + Send + Sync + 'static;

    /// Handle for one begin/commit/rollback cycle
    type Transaction: Send + 'static;

    async fn connect(&self) -> Result<Self::Connection, ConnectionError>;

    async fn disconnect(&self, connection: Self::Connection) -> Result<(), ConnectionError>;

    async fn begin(
        &self,
        connection: &Self::Connection,
    ) -> Result<Self::Transaction, TransactionError>;

    async fn commit(&self, transaction: Self::Transaction) -> Result<(), TransactionError>;

    async fn rollback(&self, transaction: Self::Transaction) -> Result<(), TransactionError>;
}
