//! Webhook Registry
//!
//! Validates and stores subscriptions, and answers which subscriptions
//! want a given event.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use reqwest::Url;
use uuid::Uuid;

use super::{RegisterWebhook, Subscription, WebhookError, WebhookRepository};

#[derive(Clone)]
pub struct WebhookRegistry {
    repository: Arc<dyn WebhookRepository>,
}

impl WebhookRegistry {
    pub fn new(repository: Arc<dyn WebhookRepository>) -> Self {
        Self { repository }
    }

    /// Validate and store a new, active subscription
    pub async fn register(&self, request: RegisterWebhook) -> Result<Subscription, WebhookError> {
        let url = validate_url(&request.url)?;
        let events = normalize_events(&request.events)?;
        let secret = match request.secret {
            Some(secret) if secret.trim().is_empty() => {
                return Err(WebhookError::Validation(
                    "secret must not be blank".to_string(),
                ))
            }
            other => other,
        };

        let subscription = Subscription {
            id: Uuid::new_v4(),
            url,
            events,
            active: true,
            secret,
            created_at: Utc::now(),
        };

        self.repository.insert(&subscription).await?;

        tracing::info!(
            webhook_id = %subscription.id,
            url = %subscription.url,
            events = ?subscription.events,
            "Webhook registered"
        );

        Ok(subscription)
    }

    pub async fn list(&self) -> Result<Vec<Subscription>, WebhookError> {
        Ok(self.repository.list().await?)
    }

    pub async fn remove(&self, id: Uuid) -> Result<(), WebhookError> {
        if !self.repository.delete(id).await? {
            return Err(WebhookError::NotFound(id));
        }

        tracing::info!(webhook_id = %id, "Webhook removed");
        Ok(())
    }

    /// Pause or resume a subscription, returning its updated state
    pub async fn set_active(&self, id: Uuid, active: bool) -> Result<Subscription, WebhookError> {
        let subscription = self
            .repository
            .set_active(id, active)
            .await?
            .ok_or(WebhookError::NotFound(id))?;

        tracing::info!(webhook_id = %id, active, "Webhook activation changed");
        Ok(subscription)
    }

    /// Active subscriptions listening for exactly `event_name`
    pub async fn matching(&self, event_name: &str) -> Result<Vec<Subscription>, WebhookError> {
        let subscriptions = self.repository.list().await?;
        Ok(subscriptions
            .into_iter()
            .filter(|s| s.matches(event_name))
            .collect())
    }
}

fn validate_url(raw: &str) -> Result<String, WebhookError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(WebhookError::Validation("url must not be empty".to_string()));
    }

    let url = Url::parse(raw)
        .map_err(|e| WebhookError::Validation(format!("url is malformed: {}", e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(WebhookError::Validation(format!(
            "url scheme must be http or https, got '{}'",
            url.scheme()
        )));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(WebhookError::Validation("url must have a host".to_string()));
    }

    Ok(raw.to_string())
}

fn normalize_events(events: &[String]) -> Result<BTreeSet<String>, WebhookError> {
    if events.is_empty() {
        return Err(WebhookError::Validation(
            "events must not be empty".to_string(),
        ));
    }

    events
        .iter()
        .map(|event| {
            let event = event.trim();
            if event.is_empty() {
                Err(WebhookError::Validation(
                    "event names must not be blank".to_string(),
                ))
            } else {
                Ok(event.to_string())
            }
        })
        .collect()
}
