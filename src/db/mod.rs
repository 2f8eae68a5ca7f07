//! Database module
//!
//! Connection lifecycle and transaction boundaries over the persistence
//! backend.

mod connector;
mod error;
mod manager;
pub mod memory;
pub mod postgres;

pub use connector::Connector;
pub use error::{ConnectionError, StoreError, TransactionError};
pub use manager::ConnectionManager;
pub use memory::{Fault, MemoryConnector};
pub use postgres::PgConnector;
