//! Counter storage
//!
//! Named integer counters kept in the `settings` key/value table. Reads and
//! writes always run inside a transaction opened by the `ConnectionManager`.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::db::memory::{MemoryDatabase, MemoryTransaction};
use crate::db::postgres::ensure_settings_table;
use crate::db::{Connector, Fault, MemoryConnector, PgConnector, StoreError};

#[async_trait]
pub trait CounterStore: Connector {
    /// Create counter storage if missing. Idempotent.
    async fn ensure_counter_storage(&self, connection: &Self::Connection)
        -> Result<(), StoreError>;

    /// Read a counter and lock it against concurrent writers until the
    /// transaction ends.
    async fn read_counter(
        &self,
        transaction: &mut Self::Transaction,
        name: &str,
    ) -> Result<Option<i64>, StoreError>;

    async fn write_counter(
        &self,
        transaction: &mut Self::Transaction,
        name: &str,
        value: i64,
    ) -> Result<(), StoreError>;
}

fn parse_counter(name: &str, value: &str) -> Result<i64, StoreError> {
    value.trim().parse().map_err(|_| StoreError::CorruptValue {
        key: name.to_string(),
        value: value.to_string(),
    })
}

// =========================================================================
// Postgres
// =========================================================================

#[async_trait]
impl CounterStore for PgConnector {
    async fn ensure_counter_storage(&self, connection: &PgPool) -> Result<(), StoreError> {
        ensure_settings_table(connection).await?;
        Ok(())
    }

    async fn read_counter(
        &self,
        transaction: &mut Self::Transaction,
        name: &str,
    ) -> Result<Option<i64>, StoreError> {
        // Materialise the row first so there is always something to lock.
        // A concurrent first allocation blocks here on the unique key.
        sqlx::query(
            r#"
            INSERT INTO settings (key, value)
            VALUES ($1, '0')
            ON CONFLICT (key) DO NOTHING
            "#,
        )
        .bind(name)
        .execute(&mut **transaction)
        .await?;

        let value: Option<String> = sqlx::query_scalar(
            r#"
            SELECT value FROM settings WHERE key = $1 FOR UPDATE
            "#,
        )
        .bind(name)
        .fetch_optional(&mut **transaction)
        .await?;

        value.map(|v| parse_counter(name, &v)).transpose()
    }

    async fn write_counter(
        &self,
        transaction: &mut Self::Transaction,
        name: &str,
        value: i64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (key)
            DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()
            "#,
        )
        .bind(name)
        .bind(value.to_string())
        .execute(&mut **transaction)
        .await?;

        Ok(())
    }
}

// =========================================================================
// In-memory
// =========================================================================

#[async_trait]
impl CounterStore for MemoryConnector {
    async fn ensure_counter_storage(&self, _connection: &MemoryDatabase) -> Result<(), StoreError> {
        Ok(())
    }

    async fn read_counter(
        &self,
        transaction: &mut MemoryTransaction,
        name: &str,
    ) -> Result<Option<i64>, StoreError> {
        transaction
            .get(name)
            .map(|v| parse_counter(name, v))
            .transpose()
    }

    async fn write_counter(
        &self,
        transaction: &mut MemoryTransaction,
        name: &str,
        value: i64,
    ) -> Result<(), StoreError> {
        if self.faults().is_set(Fault::Write) {
            return Err(StoreError::Other("injected write failure".to_string()));
        }

        transaction.stage(name, value.to_string());
        Ok(())
    }
}
