//! Application context
//!
//! Owns the shared connection and the services built on top of it.
//! Collaborators receive the context (or one of its parts) instead of
//! reaching for process-wide state.

use std::sync::Arc;

use crate::config::Config;
use crate::db::postgres::{ensure_schema, verify_connection};
use crate::db::{ConnectionError, ConnectionManager, PgConnector};
use crate::keys::KeyAllocator;
use crate::webhooks::{PgWebhookRepository, WebhookDispatcher, WebhookRegistry};

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("Failed to prepare schema: {0}")]
    Schema(#[from] sqlx::Error),

    #[error("Failed to build webhook client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Check connectivity and create any missing tables
async fn prepare(pool: &sqlx::PgPool) -> Result<(), sqlx::Error> {
    verify_connection(pool).await?;
    ensure_schema(pool).await
}

#[derive(Clone)]
pub struct AppContext {
    pub connections: Arc<ConnectionManager<PgConnector>>,
    pub keys: Arc<KeyAllocator<PgConnector>>,
    pub webhooks: WebhookRegistry,
    pub dispatcher: Arc<WebhookDispatcher>,
}

impl AppContext {
    /// Connect, prepare the schema and wire the services
    pub async fn open(config: &Config) -> Result<Self, ContextError> {
        let connector = PgConnector::new(&config.database_url, config.database_max_connections);
        let connections = Arc::new(ConnectionManager::new(connector));

        let pool = connections.get_connection().await?;
        let context = Self::wire(config, &connections, &pool).await;
        let context = connections.close_on_error(context).await?;

        tracing::info!(counter = %config.key_counter_name, "Application context ready");
        Ok(context)
    }

    async fn wire(
        config: &Config,
        connections: &Arc<ConnectionManager<PgConnector>>,
        pool: &sqlx::PgPool,
    ) -> Result<Self, ContextError> {
        prepare(pool).await?;

        let keys = Arc::new(
            KeyAllocator::new(Arc::clone(connections)).with_counter(&config.key_counter_name),
        );
        let webhooks =
            WebhookRegistry::new(Arc::new(PgWebhookRepository::new(Arc::clone(connections))));
        let dispatcher = Arc::new(WebhookDispatcher::new(
            webhooks.clone(),
            config.dispatcher_config(),
        )?);

        Ok(Self {
            connections: Arc::clone(connections),
            keys,
            webhooks,
            dispatcher,
        })
    }

    /// Close the shared connection. Services fail with connection errors
    /// afterwards until something asks for a connection again.
    pub async fn close(&self) -> Result<(), ConnectionError> {
        self.connections.close().await
    }
}
