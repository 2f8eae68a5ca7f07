//! In-memory backend
//!
//! A `Connector` over a process-local settings map. Transactions hold an
//! exclusive lock on the map for their whole lifetime, so they are fully
//! serialised, and stage their writes until commit. Faults can be injected
//! at each I/O step.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{ConnectionError, Connector, TransactionError};

/// Injectable failure points
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Connect,
    Close,
    Begin,
    Write,
    Commit,
    Rollback,
}

#[derive(Debug, Default)]
pub struct MemoryFaults {
    connect: AtomicBool,
    close: AtomicBool,
    begin: AtomicBool,
    write: AtomicBool,
    commit: AtomicBool,
    rollback: AtomicBool,
}

impl MemoryFaults {
    fn flag(&self, fault: Fault) -> &AtomicBool {
        match fault {
            Fault::Connect => &self.connect,
            Fault::Close => &self.close,
            Fault::Begin => &self.begin,
            Fault::Write => &self.write,
            Fault::Commit => &self.commit,
            Fault::Rollback => &self.rollback,
        }
    }

    pub fn set(&self, fault: Fault, enabled: bool) {
        self.flag(fault).store(enabled, Ordering::SeqCst);
    }

    pub fn is_set(&self, fault: Fault) -> bool {
        self.flag(fault).load(Ordering::SeqCst)
    }
}

/// Handle to the in-memory settings table
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    settings: Arc<Mutex<HashMap<String, String>>>,
}

/// An open transaction: exclusive access plus staged writes
pub struct MemoryTransaction {
    committed: OwnedMutexGuard<HashMap<String, String>>,
    staged: HashMap<String, String>,
}

impl MemoryTransaction {
    /// Read a value as seen from inside this transaction
    pub fn get(&self, key: &str) -> Option<&str> {
        self.staged
            .get(key)
            .or_else(|| self.committed.get(key))
            .map(String::as_str)
    }

    /// Stage a write, applied on commit
    pub fn stage(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.staged.insert(key.into(), value.into());
    }
}

#[derive(Debug, Default)]
pub struct MemoryConnector {
    database: MemoryDatabase,
    faults: Arc<MemoryFaults>,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
    connect_delay: Duration,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every connection attempt, to widen the window for concurrent callers
    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    pub fn faults(&self) -> &MemoryFaults {
        &self.faults
    }

    /// Number of connection attempts made so far
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Number of connections handed back through `disconnect`
    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    /// Committed value of a setting
    pub async fn setting(&self, key: &str) -> Option<String> {
        self.database.settings.lock().await.get(key).cloned()
    }

    /// Overwrite a committed setting directly
    pub async fn seed_setting(&self, key: &str, value: &str) {
        self.database
            .settings
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    type Connection = MemoryDatabase;
    type Transaction = MemoryTransaction;

    async fn connect(&self) -> Result<MemoryDatabase, ConnectionError> {
        self.connects.fetch_add(1, Ordering::SeqCst);

        if !self.connect_delay.is_zero() {
            tokio::time::sleep(self.connect_delay).await;
        }

        if self.faults.is_set(Fault::Connect) {
            return Err(ConnectionError::Connect("injected connect failure".to_string()));
        }

        Ok(self.database.clone())
    }

    async fn disconnect(&self, _connection: MemoryDatabase) -> Result<(), ConnectionError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);

        if self.faults.is_set(Fault::Close) {
            return Err(ConnectionError::Close("injected close failure".to_string()));
        }
        Ok(())
    }

    async fn begin(
        &self,
        connection: &MemoryDatabase,
    ) -> Result<MemoryTransaction, TransactionError> {
        if self.faults.is_set(Fault::Begin) {
            return Err(TransactionError::Begin("injected begin failure".to_string()));
        }

        let committed = Arc::clone(&connection.settings).lock_owned().await;
        Ok(MemoryTransaction {
            committed,
            staged: HashMap::new(),
        })
    }

    async fn commit(&self, mut transaction: MemoryTransaction) -> Result<(), TransactionError> {
        if self.faults.is_set(Fault::Commit) {
            return Err(TransactionError::Commit("injected commit failure".to_string()));
        }

        let staged = std::mem::take(&mut transaction.staged);
        transaction.committed.extend(staged);
        Ok(())
    }

    async fn rollback(&self, transaction: MemoryTransaction) -> Result<(), TransactionError> {
        drop(transaction);

        if self.faults.is_set(Fault::Rollback) {
            return Err(TransactionError::Rollback(
                "injected rollback failure".to_string(),
            ));
        }
        Ok(())
    }
}
