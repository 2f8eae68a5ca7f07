//! Postgres backend
//!
//! Opens a `PgPool` as the managed connection and maps sqlx transactions
//! onto the `Connector` contract.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};

use super::{ConnectionError, Connector, TransactionError};

#[derive(Debug, Clone)]
pub struct PgConnector {
    database_url: String,
    max_connections: u32,
    acquire_timeout: Duration,
}

impl PgConnector {
    pub fn new(database_url: impl Into<String>, max_connections: u32) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections,
            acquire_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }
}

#[async_trait]
impl Connector for PgConnector {
    type Connection = PgPool;
    type Transaction = Transaction<'static, Postgres>;

    async fn connect(&self) -> Result<PgPool, ConnectionError> {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout)
            .connect(&self.database_url)
            .await
            .map_err(|e| ConnectionError::Connect(e.to_string()))
    }

    async fn disconnect(&self, connection: PgPool) -> Result<(), ConnectionError> {
        connection.close().await;
        Ok(())
    }

    async fn begin(&self, connection: &PgPool) -> Result<Self::Transaction, TransactionError> {
        connection
            .begin()
            .await
            .map_err(|e| TransactionError::Begin(e.to_string()))
    }

    async fn commit(&self, transaction: Self::Transaction) -> Result<(), TransactionError> {
        transaction
            .commit()
            .await
            .map_err(|e| TransactionError::Commit(e.to_string()))
    }

    async fn rollback(&self, transaction: Self::Transaction) -> Result<(), TransactionError> {
        transaction
            .rollback()
            .await
            .map_err(|e| TransactionError::Rollback(e.to_string()))
    }
}

/// Simple connectivity check
pub async fn verify_connection(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Create the settings table if it does not exist
pub async fn ensure_settings_table(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the webhooks table if it does not exist
pub async fn ensure_webhooks_table(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS webhooks (
            id UUID PRIMARY KEY,
            url TEXT NOT NULL,
            events TEXT[] NOT NULL,
            active BOOLEAN NOT NULL DEFAULT TRUE,
            secret TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Ensure every table the core needs exists
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    ensure_settings_table(pool).await?;
    ensure_webhooks_table(pool).await?;
    tracing::info!("Database schema verified: settings, webhooks");
    Ok(())
}
