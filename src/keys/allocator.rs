//! Key Allocator
//!
//! Hands out `"{PREFIX}-{n}"` keys from a single persisted counter. The
//! read-increment-write runs in one transaction with the counter row
//! locked, so overlapping calls never observe the same value.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::db::ConnectionManager;

use super::{AllocationError, CounterStore};

/// Counter shared by every entity kind
pub const DEFAULT_COUNTER: &str = "last_issue_index";

/// Known entity key prefixes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyPrefix {
    Task,
    Story,
    Epic,
    Bug,
    Subtask,
}

impl KeyPrefix {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyPrefix::Task => "TASK",
            KeyPrefix::Story => "STOR",
            KeyPrefix::Epic => "EPIC",
            KeyPrefix::Bug => "BUG",
            KeyPrefix::Subtask => "SUBT",
        }
    }
}

impl fmt::Display for KeyPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyPrefix {
    type Err = AllocationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TASK" => Ok(KeyPrefix::Task),
            "STOR" => Ok(KeyPrefix::Story),
            "EPIC" => Ok(KeyPrefix::Epic),
            "BUG" => Ok(KeyPrefix::Bug),
            "SUBT" => Ok(KeyPrefix::Subtask),
            other => Err(AllocationError::InvalidPrefix(other.to_string())),
        }
    }
}

/// Format a key from its parts
pub fn format_key(prefix: &str, number: i64) -> String {
    format!("{}-{}", prefix, number)
}

/// Split a key into prefix and number
pub fn parse_key(key: &str) -> Option<(&str, i64)> {
    let (prefix, number) = key.rsplit_once('-')?;
    if validate_prefix(prefix).is_err() {
        return None;
    }
    number.parse().ok().map(|n| (prefix, n))
}

fn validate_prefix(prefix: &str) -> Result<(), AllocationError> {
    if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(AllocationError::InvalidPrefix(prefix.to_string()));
    }
    Ok(())
}

/// Allocator of unique, increasing entity keys
pub struct KeyAllocator<C: CounterStore> {
    connections: Arc<ConnectionManager<C>>,
    counter: String,
    storage_ready: OnceCell<()>,
}

impl<C: CounterStore> KeyAllocator<C> {
    pub fn new(connections: Arc<ConnectionManager<C>>) -> Self {
        Self {
            connections,
            counter: DEFAULT_COUNTER.to_string(),
            storage_ready: OnceCell::new(),
        }
    }

    /// Use a different counter name
    pub fn with_counter(mut self, counter: impl Into<String>) -> Self {
        self.counter = counter.into();
        self
    }

    pub fn counter_name(&self) -> &str {
        &self.counter
    }

    /// Allocate the next key for `prefix`.
    ///
    /// On error the persisted counter is left as it was.
    pub async fn allocate(&self, prefix: &str) -> Result<String, AllocationError> {
        validate_prefix(prefix)?;
        self.ensure_storage().await?;

        let counter = self.counter.clone();
        let next = self
            .connections
            .transaction(move |store, tx| {
                Box::pin(async move {
                    let current = store.read_counter(tx, &counter).await?.unwrap_or(0);
                    let next = current
                        .checked_add(1)
                        .ok_or_else(|| AllocationError::CounterOverflow(counter.clone()))?;
                    store.write_counter(tx, &counter, next).await?;
                    Ok::<i64, AllocationError>(next)
                })
            })
            .await
            .map_err(|e| {
                tracing::warn!(prefix, counter = %self.counter, error = %e, "Key allocation failed");
                e
            })?;

        let key = format_key(prefix, next);
        tracing::debug!(prefix, counter = %self.counter, value = next, key = %key, "Allocated key");
        Ok(key)
    }

    /// Allocate a key for one of the known entity kinds
    pub async fn allocate_for(&self, prefix: KeyPrefix) -> Result<String, AllocationError> {
        self.allocate(prefix.as_str()).await
    }

    /// Current persisted counter value, 0 if never allocated
    pub async fn current(&self) -> Result<i64, AllocationError> {
        self.ensure_storage().await?;

        let mut tx = self.connections.begin_transaction().await?;
        let value = self
            .connections
            .connector()
            .read_counter(&mut tx, &self.counter)
            .await;

        // Read-only: discard whatever the read materialised
        if let Err(e) = self.connections.rollback(tx).await {
            tracing::warn!(error = %e, "Rollback after counter read failed");
        }

        Ok(value?.unwrap_or(0))
    }

    async fn ensure_storage(&self) -> Result<(), AllocationError> {
        self.storage_ready
            .get_or_try_init(|| async {
                let connection = self.connections.get_connection().await?;
                self.connections
                    .connector()
                    .ensure_counter_storage(&connection)
                    .await?;
                Ok::<(), AllocationError>(())
            })
            .await?;
        Ok(())
    }
}
