//! Common test utilities

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tracker_core::db::{ConnectionManager, MemoryConnector, PgConnector};
use tracker_core::keys::KeyAllocator;
use tracker_core::webhooks::{
    DispatcherConfig, MemoryWebhookRepository, RetryPolicy, WebhookDispatcher, WebhookRegistry,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Retry policy with the production attempt count but millisecond delays
pub fn fast_retry_policy() -> RetryPolicy {
    RetryPolicy::new(4, Duration::from_millis(5)).with_max_delay(Duration::from_millis(20))
}

pub fn memory_allocator() -> (
    Arc<KeyAllocator<MemoryConnector>>,
    Arc<ConnectionManager<MemoryConnector>>,
) {
    let connections = Arc::new(ConnectionManager::new(MemoryConnector::new()));
    let allocator = Arc::new(KeyAllocator::new(Arc::clone(&connections)));
    (allocator, connections)
}

pub struct WebhookHarness {
    pub repository: Arc<MemoryWebhookRepository>,
    pub registry: WebhookRegistry,
    pub dispatcher: Arc<WebhookDispatcher>,
}

/// Registry and dispatcher over an in-memory repository
pub fn webhook_harness() -> WebhookHarness {
    let repository = Arc::new(MemoryWebhookRepository::new());
    let registry = WebhookRegistry::new(repository.clone());
    let config = DispatcherConfig {
        retry: fast_retry_policy(),
        request_timeout: Duration::from_secs(2),
        connect_timeout: Duration::from_secs(1),
        ..Default::default()
    };
    let dispatcher = Arc::new(
        WebhookDispatcher::new(registry.clone(), config).expect("Failed to build webhook client"),
    );

    WebhookHarness {
        repository,
        registry,
        dispatcher,
    }
}

/// Mock subscriber answering every POST to `route` with `status`
pub async fn subscriber(route: &str, status: u16) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status))
        .mount(&server)
        .await;
    server
}

/// Postgres-backed connection manager for the ignored database tests
pub async fn postgres_connections() -> Arc<ConnectionManager<PgConnector>> {
    dotenvy::dotenv().ok();
    let database_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests");

    let connections = Arc::new(ConnectionManager::new(PgConnector::new(database_url, 10)));
    let pool = connections
        .get_connection()
        .await
        .expect("Failed to connect to DB");
    tracker_core::db::postgres::ensure_schema(&pool)
        .await
        .expect("Failed to prepare schema");
    connections
}
