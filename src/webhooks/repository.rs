//! Webhook Repository
//!
//! Persistence for webhook subscriptions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{OnceCell, RwLock};
use uuid::Uuid;

use crate::db::postgres::ensure_webhooks_table;
use crate::db::{ConnectionError, ConnectionManager, PgConnector, StoreError};

use super::Subscription;

#[async_trait]
pub trait WebhookRepository: Send + Sync {
    async fn insert(&self, subscription: &Subscription) -> Result<(), StoreError>;

    async fn list(&self) -> Result<Vec<Subscription>, StoreError>;

    /// Returns false when no subscription had this id
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Returns the updated subscription, or None when no subscription had this id
    async fn set_active(&self, id: Uuid, active: bool)
        -> Result<Option<Subscription>, StoreError>;
}

// =========================================================================
// Postgres
// =========================================================================

type SubscriptionRow = (Uuid, String, Vec<String>, bool, Option<String>, DateTime<Utc>);

fn from_row(row: SubscriptionRow) -> Subscription {
    let (id, url, events, active, secret, created_at) = row;
    Subscription {
        id,
        url,
        events: events.into_iter().collect(),
        active,
        secret,
        created_at,
    }
}

pub struct PgWebhookRepository {
    connections: Arc<ConnectionManager<PgConnector>>,
    table_ready: OnceCell<()>,
}

impl PgWebhookRepository {
    pub fn new(connections: Arc<ConnectionManager<PgConnector>>) -> Self {
        Self {
            connections,
            table_ready: OnceCell::new(),
        }
    }

    async fn pool(&self) -> Result<sqlx::PgPool, StoreError> {
        let pool = self.connections.get_connection().await?;
        self.table_ready
            .get_or_try_init(|| ensure_webhooks_table(&pool))
            .await?;
        Ok(pool)
    }
}

#[async_trait]
impl WebhookRepository for PgWebhookRepository {
    async fn insert(&self, subscription: &Subscription) -> Result<(), StoreError> {
        let pool = self.pool().await?;
        let events: Vec<String> = subscription.events.iter().cloned().collect();

        sqlx::query(
            r#"
            INSERT INTO webhooks (id, url, events, active, secret, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(subscription.id)
        .bind(&subscription.url)
        .bind(events)
        .bind(subscription.active)
        .bind(&subscription.secret)
        .bind(subscription.created_at)
        .execute(&pool)
        .await?;

        Ok(())
    }

    async fn list(&self) -> Result<Vec<Subscription>, StoreError> {
        let pool = self.pool().await?;

        let rows: Vec<SubscriptionRow> = sqlx::query_as(
            r#"
            SELECT id, url, events, active, secret, created_at
            FROM webhooks
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&pool)
        .await?;

        Ok(rows.into_iter().map(from_row).collect())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let pool = self.pool().await?;

        let rows = sqlx::query("DELETE FROM webhooks WHERE id = $1")
            .bind(id)
            .execute(&pool)
            .await?
            .rows_affected();

        Ok(rows > 0)
    }

    async fn set_active(
        &self,
        id: Uuid,
        active: bool,
    ) -> Result<Option<Subscription>, StoreError> {
        let pool = self.pool().await?;

        let row: Option<SubscriptionRow> = sqlx::query_as(
            r#"
            UPDATE webhooks SET active = $2
            WHERE id = $1
            RETURNING id, url, events, active, secret, created_at
            "#,
        )
        .bind(id)
        .bind(active)
        .fetch_optional(&pool)
        .await?;

        Ok(row.map(from_row))
    }
}

// =========================================================================
// In-memory
// =========================================================================

/// Process-local repository; can be switched to an unavailable state
#[derive(Debug, Default)]
pub struct MemoryWebhookRepository {
    subscriptions: RwLock<Vec<Subscription>>,
    unavailable: AtomicBool,
}

impl MemoryWebhookRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail with a connection error
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ConnectionError::Connect("webhook store unavailable".to_string()).into());
        }
        Ok(())
    }
}

#[async_trait]
impl WebhookRepository for MemoryWebhookRepository {
    async fn insert(&self, subscription: &Subscription) -> Result<(), StoreError> {
        self.check_available()?;
        self.subscriptions.write().await.push(subscription.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Subscription>, StoreError> {
        self.check_available()?;
        Ok(self.subscriptions.read().await.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        self.check_available()?;
        let mut subscriptions = self.subscriptions.write().await;
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != id);
        Ok(subscriptions.len() != before)
    }

    async fn set_active(
        &self,
        id: Uuid,
        active: bool,
    ) -> Result<Option<Subscription>, StoreError> {
        self.check_available()?;
        let mut subscriptions = self.subscriptions.write().await;
        Ok(subscriptions.iter_mut().find(|s| s.id == id).map(|subscription| {
            subscription.active = active;
            subscription.clone()
        }))
    }
}
