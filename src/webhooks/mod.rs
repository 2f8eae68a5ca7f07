//! Webhooks module
//!
//! Subscriber registry and outbound event delivery.

mod dispatcher;
mod error;
mod models;
mod registry;
mod repository;
mod retry;
pub mod signing;

pub use dispatcher::{
    DeliveryOutcome, DeliveryReport, DispatchReport, DispatcherConfig, WebhookDispatcher,
    ATTEMPT_HEADER, DELIVERY_HEADER, EVENT_HEADER, SIGNATURE_HEADER,
};
pub use error::{DeliveryError, WebhookError};
pub use models::{
    entity_field, event_name, webhook_body, EntityKind, EventAction, RegisterWebhook,
    Subscription,
};
pub use registry::WebhookRegistry;
pub use repository::{MemoryWebhookRepository, PgWebhookRepository, WebhookRepository};
pub use retry::{RetryOutcome, RetryPolicy, Retryable};
