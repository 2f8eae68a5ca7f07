//! Webhook Dispatcher
//!
//! Delivers an event to every active subscription listening for it. Each
//! subscription is delivered to independently and concurrently, with its
//! own retry sequence. Nothing here ever fails the caller: lookup errors
//! and delivery failures are logged and reported, not returned.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use uuid::Uuid;

use super::retry::Retryable;
use super::signing::sign_payload;
use super::{webhook_body, DeliveryError, RetryPolicy, Subscription, WebhookRegistry};

pub const EVENT_HEADER: &str = "X-Webhook-Event";
pub const DELIVERY_HEADER: &str = "X-Webhook-Delivery";
pub const ATTEMPT_HEADER: &str = "X-Webhook-Attempt";
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub retry: RetryPolicy,
    /// Bound on each delivery attempt
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub user_agent: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            user_agent: format!("tracker-webhooks/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Terminal state of one subscription's delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Subscriber answered 2xx
    Delivered { status: u16 },
    /// Subscriber answered with a non-retryable status
    Rejected { status: u16 },
    /// Every attempt failed with a retryable error
    Exhausted { last_error: String },
}

#[derive(Debug, Clone)]
pub struct DeliveryReport {
    pub subscription_id: Uuid,
    pub url: String,
    pub delivery_id: Uuid,
    pub attempts: u32,
    pub outcome: DeliveryOutcome,
}

impl DeliveryReport {
    pub fn is_delivered(&self) -> bool {
        matches!(self.outcome, DeliveryOutcome::Delivered { .. })
    }
}

/// Result of one dispatch across all matching subscriptions
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    pub event_name: String,
    pub deliveries: Vec<DeliveryReport>,
    /// Subscriptions could not be loaded; nothing was delivered
    pub lookup_failed: bool,
}

impl DispatchReport {
    pub fn delivered_count(&self) -> usize {
        self.deliveries.iter().filter(|d| d.is_delivered()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.deliveries.len() - self.delivered_count()
    }

    pub fn for_subscription(&self, id: Uuid) -> Option<&DeliveryReport> {
        self.deliveries.iter().find(|d| d.subscription_id == id)
    }
}

pub struct WebhookDispatcher {
    registry: WebhookRegistry,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl WebhookDispatcher {
    pub fn new(registry: WebhookRegistry, config: DispatcherConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .user_agent(config.user_agent)
            .build()?;

        Ok(Self {
            registry,
            client,
            retry: config.retry,
        })
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Notify subscribers of an event. Resolves once every matching
    /// subscription has been delivered to or given up on; never fails.
    pub async fn trigger<P>(&self, event_name: &str, payload: &P)
    where
        P: Serialize + ?Sized,
    {
        let report = self.dispatch(event_name, payload).await;

        if report.failed_count() > 0 {
            tracing::warn!(
                event = event_name,
                delivered = report.delivered_count(),
                failed = report.failed_count(),
                "Webhook dispatch finished with failures"
            );
        } else {
            tracing::debug!(
                event = event_name,
                delivered = report.delivered_count(),
                "Webhook dispatch finished"
            );
        }
    }

    /// Run `trigger` on a background task
    pub fn spawn_trigger(
        self: &Arc<Self>,
        event_name: impl Into<String>,
        payload: serde_json::Value,
    ) -> tokio::task::JoinHandle<()> {
        let dispatcher = Arc::clone(self);
        let event_name = event_name.into();
        tokio::spawn(async move { dispatcher.trigger(&event_name, &payload).await })
    }

    /// Deliver an event and report what happened to each subscription
    pub async fn dispatch<P>(&self, event_name: &str, payload: &P) -> DispatchReport
    where
        P: Serialize + ?Sized,
    {
        let mut report = DispatchReport {
            event_name: event_name.to_string(),
            ..Default::default()
        };

        let body = match serde_json::to_value(payload)
            .and_then(|payload| serde_json::to_vec(&webhook_body(event_name, payload)))
        {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(event = event_name, error = %e, "Failed to encode webhook payload");
                return report;
            }
        };

        let subscriptions = match self.registry.matching(event_name).await {
            Ok(subscriptions) => subscriptions,
            Err(e) => {
                tracing::error!(
                    event = event_name,
                    error = %e,
                    "Failed to load webhook subscriptions, skipping dispatch"
                );
                report.lookup_failed = true;
                return report;
            }
        };

        if subscriptions.is_empty() {
            tracing::debug!(event = event_name, "No webhook subscriptions for event");
            return report;
        }

        report.deliveries = join_all(
            subscriptions
                .iter()
                .map(|subscription| self.deliver(subscription, event_name, &body)),
        )
        .await;

        report
    }

    async fn deliver(
        &self,
        subscription: &Subscription,
        event_name: &str,
        body: &[u8],
    ) -> DeliveryReport {
        let delivery_id = Uuid::new_v4();
        let signature = subscription
            .secret
            .as_deref()
            .map(|secret| sign_payload(secret, body));

        let outcome = self
            .retry
            .run(|attempt| {
                self.send_attempt(
                    subscription,
                    event_name,
                    delivery_id,
                    attempt,
                    body,
                    signature.as_deref(),
                )
            })
            .await;

        let outcome_state = match outcome.result {
            Ok(status) => {
                tracing::info!(
                    webhook_id = %subscription.id,
                    event = event_name,
                    delivery_id = %delivery_id,
                    attempts = outcome.attempts,
                    status,
                    "Webhook delivered"
                );
                DeliveryOutcome::Delivered { status }
            }
            Err(DeliveryError::Status(status)) if !DeliveryError::Status(status).is_retryable() => {
                tracing::warn!(
                    webhook_id = %subscription.id,
                    event = event_name,
                    delivery_id = %delivery_id,
                    status,
                    "Webhook rejected by subscriber, not retrying"
                );
                DeliveryOutcome::Rejected { status }
            }
            Err(error) => {
                tracing::error!(
                    webhook_id = %subscription.id,
                    event = event_name,
                    delivery_id = %delivery_id,
                    attempts = outcome.attempts,
                    error = %error,
                    "Webhook delivery failed after retries"
                );
                DeliveryOutcome::Exhausted {
                    last_error: error.to_string(),
                }
            }
        };

        DeliveryReport {
            subscription_id: subscription.id,
            url: subscription.url.clone(),
            delivery_id,
            attempts: outcome.attempts,
            outcome: outcome_state,
        }
    }

    async fn send_attempt(
        &self,
        subscription: &Subscription,
        event_name: &str,
        delivery_id: Uuid,
        attempt: u32,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<u16, DeliveryError> {
        tracing::debug!(
            webhook_id = %subscription.id,
            url = %subscription.url,
            event = event_name,
            attempt,
            "Sending webhook"
        );

        let mut request = self
            .client
            .post(&subscription.url)
            .header(CONTENT_TYPE, "application/json")
            .header(EVENT_HEADER, event_name)
            .header(DELIVERY_HEADER, delivery_id.to_string())
            .header(ATTEMPT_HEADER, attempt.to_string())
            .body(body.to_vec());

        if let Some(signature) = signature {
            request = request.header(SIGNATURE_HEADER, signature);
        }

        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            Ok(status.as_u16())
        } else {
            tracing::warn!(
                webhook_id = %subscription.id,
                attempt,
                status = status.as_u16(),
                "Webhook attempt got non-success status"
            );
            Err(DeliveryError::Status(status.as_u16()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webhooks::{MemoryWebhookRepository, RegisterWebhook};
    use serde_json::json;

    fn dispatcher() -> (WebhookDispatcher, WebhookRegistry, Arc<MemoryWebhookRepository>) {
        let repo = Arc::new(MemoryWebhookRepository::new());
        let registry = WebhookRegistry::new(repo.clone());
        let config = DispatcherConfig {
            retry: RetryPolicy::new(4, Duration::from_millis(1)),
            request_timeout: Duration::from_secs(2),
            connect_timeout: Duration::from_secs(1),
            ..Default::default()
        };
        let dispatcher = WebhookDispatcher::new(registry.clone(), config).unwrap();
        (dispatcher, registry, repo)
    }

    /// An address nothing listens on
    fn closed_port_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        format!("http://127.0.0.1:{}/hook", port)
    }

    #[tokio::test]
    async fn test_network_failure_gets_exactly_four_attempts() {
        let (dispatcher, registry, _) = dispatcher();
        let sub = registry
            .register(RegisterWebhook::new(closed_port_url(), ["issue_created"]))
            .await
            .unwrap();

        let report = dispatcher.dispatch("issue_created", &json!({"id": 1})).await;

        let delivery = report.for_subscription(sub.id).unwrap();
        assert_eq!(delivery.attempts, 4);
        assert!(matches!(delivery.outcome, DeliveryOutcome::Exhausted { .. }));
    }

    #[tokio::test]
    async fn test_lookup_failure_is_contained() {
        let (dispatcher, registry, repo) = dispatcher();
        registry
            .register(RegisterWebhook::new(closed_port_url(), ["issue_created"]))
            .await
            .unwrap();
        repo.set_unavailable(true);

        let report = dispatcher.dispatch("issue_created", &json!({"id": 1})).await;
        assert!(report.lookup_failed);
        assert!(report.deliveries.is_empty());

        // trigger itself just returns
        dispatcher.trigger("issue_created", &json!({"id": 1})).await;
    }

    #[tokio::test]
    async fn test_no_matching_subscriptions() {
        let (dispatcher, registry, _) = dispatcher();
        registry
            .register(RegisterWebhook::new(closed_port_url(), ["issue_created"]))
            .await
            .unwrap();

        let report = dispatcher.dispatch("issue", &json!({"id": 1})).await;
        assert!(!report.lookup_failed);
        assert!(report.deliveries.is_empty());
    }

    #[test]
    fn test_report_counts() {
        let delivered = DeliveryReport {
            subscription_id: Uuid::new_v4(),
            url: "http://a".to_string(),
            delivery_id: Uuid::new_v4(),
            attempts: 1,
            outcome: DeliveryOutcome::Delivered { status: 200 },
        };
        let rejected = DeliveryReport {
            outcome: DeliveryOutcome::Rejected { status: 404 },
            subscription_id: Uuid::new_v4(),
            ..delivered.clone()
        };

        let report = DispatchReport {
            event_name: "issue_created".to_string(),
            deliveries: vec![delivered.clone(), rejected],
            lookup_failed: false,
        };
        assert_eq!(report.delivered_count(), 1);
        assert_eq!(report.failed_count(), 1);
        assert!(report.for_subscription(delivered.subscription_id).unwrap().is_delivered());
    }
}
