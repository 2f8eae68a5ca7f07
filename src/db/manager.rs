//! Connection Manager
//!
//! Owns the single persistence connection. The connection is established
//! lazily on first use; concurrent callers that arrive while it is being
//! established all await the same attempt. A failed attempt leaves the
//! manager idle so the next call starts over.

use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Mutex;

use super::{ConnectionError, Connector, TransactionError};

type PendingConnection<T> = Shared<BoxFuture<'static, Result<T, ConnectionError>>>;

enum ConnectionState<T> {
    Idle,
    Connecting {
        generation: u64,
        pending: PendingConnection<T>,
    },
    Open {
        generation: u64,
        connection: T,
    },
}

/// Lifecycle owner for the persistence connection
pub struct ConnectionManager<C: Connector> {
    connector: Arc<C>,
    state: Mutex<ConnectionState<C::Connection>>,
    generation: AtomicU64,
}

impl<C: Connector> ConnectionManager<C> {
    /// Create a manager; no connection is opened until first use
    pub fn new(connector: C) -> Self {
        Self {
            connector: Arc::new(connector),
            state: Mutex::new(ConnectionState::Idle),
            generation: AtomicU64::new(0),
        }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    // =========================================================================
    // Connection lifecycle
    // =========================================================================

    /// Get the live connection, establishing it if needed.
    ///
    /// Never retries on its own: a failure is returned to every waiter and
    /// the next call makes a fresh attempt.
    pub async fn get_connection(&self) -> Result<C::Connection, ConnectionError> {
        let (generation, pending) = {
            let mut state = self.state.lock().await;
            match &*state {
                ConnectionState::Open { connection, .. } => return Ok(connection.clone()),
                ConnectionState::Connecting {
                    generation,
                    pending,
                } => (*generation, pending.clone()),
                ConnectionState::Idle => {
                    let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
                    let connector = Arc::clone(&self.connector);
                    let pending = async move { connector.connect().await }
                        .boxed()
                        .shared();

                    tracing::debug!(generation, "Establishing persistence connection");
                    *state = ConnectionState::Connecting {
                        generation,
                        pending: pending.clone(),
                    };
                    (generation, pending)
                }
            }
        };

        let result = pending.await;

        // Only the attempt that is still current may update the state; a
        // close() issued meanwhile has already reset it.
        let mut state = self.state.lock().await;
        let is_current = matches!(
            &*state,
            ConnectionState::Connecting { generation: current, .. } if *current == generation
        );

        if !is_current {
            // close() ran while this attempt was in flight and disconnects
            // whatever it produced; the handle must not escape.
            return match result {
                Ok(_) => Err(ConnectionError::Connect(
                    "connection closed while it was being established".to_string(),
                )),
                Err(error) => Err(error),
            };
        }

        *state = match &result {
            Ok(connection) => {
                tracing::info!(generation, "Persistence connection established");
                ConnectionState::Open {
                    generation,
                    connection: connection.clone(),
                }
            }
            Err(error) => {
                tracing::warn!(generation, error = %error, "Persistence connection failed");
                ConnectionState::Idle
            }
        };

        result
    }

    /// Whether a connection is currently open
    pub async fn is_connected(&self) -> bool {
        matches!(&*self.state.lock().await, ConnectionState::Open { .. })
    }

    /// Close the connection if one is open.
    ///
    /// An attempt still in flight is awaited and its connection closed;
    /// callers waiting on it get a `ConnectionError`. The manager is idle
    /// afterwards even when closing fails.
    pub async fn close(&self) -> Result<(), ConnectionError> {
        let previous = {
            let mut state = self.state.lock().await;
            std::mem::replace(&mut *state, ConnectionState::Idle)
        };

        match previous {
            ConnectionState::Idle => Ok(()),
            ConnectionState::Connecting {
                generation,
                pending,
            } => match pending.await {
                Ok(connection) => {
                    tracing::debug!(generation, "Closing connection established during close");
                    self.disconnect(generation, connection).await
                }
                Err(_) => Ok(()),
            },
            ConnectionState::Open {
                generation,
                connection,
            } => self.disconnect(generation, connection).await,
        }
    }

    /// Pass `result` through, closing the connection first when it is an
    /// error. Close failures are logged; the original error is returned.
    pub async fn close_on_error<T, E>(&self, result: Result<T, E>) -> Result<T, E>
    where
        E: Display,
    {
        if let Err(error) = &result {
            if let Err(close_error) = self.close().await {
                tracing::warn!(
                    error = %close_error,
                    cause = %error,
                    "Failed to close connection after setup error"
                );
            }
        }
        result
    }

    async fn disconnect(
        &self,
        generation: u64,
        connection: C::Connection,
    ) -> Result<(), ConnectionError> {
        match self.connector.disconnect(connection).await {
            Ok(()) => {
                tracing::info!(generation, "Persistence connection closed");
                Ok(())
            }
            Err(error) => {
                tracing::error!(generation, error = %error, "Failed to close persistence connection");
                Err(error)
            }
        }
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    pub async fn begin_transaction(&self) -> Result<C::Transaction, TransactionError> {
        let connection = self.get_connection().await?;
        self.connector.begin(&connection).await
    }

    pub async fn commit(&self, transaction: C::Transaction) -> Result<(), TransactionError> {
        self.connector.commit(transaction).await
    }

    pub async fn rollback(&self, transaction: C::Transaction) -> Result<(), TransactionError> {
        self.connector.rollback(transaction).await
    }

    /// Run `operation` inside a transaction.
    ///
    /// Commits when the operation returns `Ok`, rolls back when it returns
    /// `Err`. A rollback failure is logged and the operation's error is
    /// returned. If the returned future is dropped midway the transaction
    /// handle is dropped uncommitted.
    pub async fn transaction<T, E, F>(&self, operation: F) -> Result<T, E>
    where
        F: for<'t> FnOnce(&'t C, &'t mut C::Transaction) -> BoxFuture<'t, Result<T, E>>,
        E: From<TransactionError> + Display,
    {
        let mut transaction = self.begin_transaction().await?;

        match operation(&self.connector, &mut transaction).await {
            Ok(value) => {
                self.commit(transaction).await?;
                Ok(value)
            }
            Err(error) => {
                if let Err(rollback_error) = self.rollback(transaction).await {
                    tracing::error!(
                        error = %rollback_error,
                        cause = %error,
                        "Rollback failed after transaction error"
                    );
                }
                Err(error)
            }
        }
    }
}
