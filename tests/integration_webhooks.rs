//! Webhook Delivery Integration Tests

use serde_json::{json, Value};
use tracker_core::webhooks::signing::verify_signature;
use tracker_core::webhooks::{
    DeliveryOutcome, RegisterWebhook, ATTEMPT_HEADER, DELIVERY_HEADER, EVENT_HEADER,
    SIGNATURE_HEADER,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

mod common;

fn header<'a>(request: &'a Request, name: &str) -> Option<&'a str> {
    request.headers.get(name).and_then(|v| v.to_str().ok())
}

async fn received(server: &MockServer) -> Vec<Request> {
    server.received_requests().await.unwrap_or_default()
}

#[tokio::test]
async fn test_issue_created_delivers_exact_body() {
    let harness = common::webhook_harness();
    let server = common::subscriber("/hook", 200).await;
    harness
        .registry
        .register(RegisterWebhook::new(format!("{}/hook", server.uri()), ["issue_created"]))
        .await
        .unwrap();

    harness
        .dispatcher
        .trigger("issue_created", &json!({"id": 1, "key": "TASK-1"}))
        .await;

    let requests = received(&server).await;
    assert_eq!(requests.len(), 1);

    let request = &requests[0];
    let body: Value = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(
        body,
        json!({"webhookEvent": "issue_created", "issue": {"id": 1, "key": "TASK-1"}})
    );
    assert_eq!(header(request, "content-type"), Some("application/json"));
    assert_eq!(header(request, EVENT_HEADER), Some("issue_created"));
    assert_eq!(header(request, ATTEMPT_HEADER), Some("1"));
    assert!(header(request, DELIVERY_HEADER).is_some());
    assert!(header(request, SIGNATURE_HEADER).is_none());
}

#[tokio::test]
async fn test_epic_events_use_epic_field() {
    let harness = common::webhook_harness();
    let server = common::subscriber("/hook", 204).await;
    harness
        .registry
        .register(RegisterWebhook::new(format!("{}/hook", server.uri()), ["epic_updated"]))
        .await
        .unwrap();

    let report = harness
        .dispatcher
        .dispatch("epic_updated", &json!({"key": "EPIC-3"}))
        .await;
    assert_eq!(report.delivered_count(), 1);

    let body: Value = serde_json::from_slice(&received(&server).await[0].body).unwrap();
    assert_eq!(body, json!({"webhookEvent": "epic_updated", "epic": {"key": "EPIC-3"}}));
}

#[tokio::test]
async fn test_event_matching_is_exact() {
    let harness = common::webhook_harness();
    let server = common::subscriber("/hook", 200).await;
    harness
        .registry
        .register(RegisterWebhook::new(format!("{}/hook", server.uri()), ["issue"]))
        .await
        .unwrap();

    let report = harness
        .dispatcher
        .dispatch("issue_created", &json!({"id": 1}))
        .await;

    assert!(report.deliveries.is_empty());
    assert!(received(&server).await.is_empty());
}

#[tokio::test]
async fn test_server_errors_retry_up_to_four_attempts() {
    let harness = common::webhook_harness();
    let server = common::subscriber("/hook", 500).await;
    let sub = harness
        .registry
        .register(RegisterWebhook::new(format!("{}/hook", server.uri()), ["issue_created"]))
        .await
        .unwrap();

    let report = harness
        .dispatcher
        .dispatch("issue_created", &json!({"id": 1}))
        .await;

    let delivery = report.for_subscription(sub.id).unwrap();
    assert_eq!(delivery.attempts, 4);
    assert!(matches!(delivery.outcome, DeliveryOutcome::Exhausted { .. }));

    let requests = received(&server).await;
    assert_eq!(requests.len(), 4);

    let attempts: Vec<&str> = requests
        .iter()
        .map(|r| header(r, ATTEMPT_HEADER).unwrap())
        .collect();
    assert_eq!(attempts, vec!["1", "2", "3", "4"]);

    // Every retry carries the same delivery id
    let delivery_id = delivery.delivery_id.to_string();
    assert!(requests
        .iter()
        .all(|r| header(r, DELIVERY_HEADER) == Some(delivery_id.as_str())));
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let harness = common::webhook_harness();
    let server = common::subscriber("/hook", 404).await;
    let sub = harness
        .registry
        .register(RegisterWebhook::new(format!("{}/hook", server.uri()), ["issue_created"]))
        .await
        .unwrap();

    let report = harness
        .dispatcher
        .dispatch("issue_created", &json!({"id": 1}))
        .await;

    let delivery = report.for_subscription(sub.id).unwrap();
    assert_eq!(delivery.attempts, 1);
    assert_eq!(delivery.outcome, DeliveryOutcome::Rejected { status: 404 });
    assert_eq!(received(&server).await.len(), 1);
}

#[tokio::test]
async fn test_transient_failure_then_success() {
    let harness = common::webhook_harness();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let sub = harness
        .registry
        .register(RegisterWebhook::new(format!("{}/hook", server.uri()), ["issue_created"]))
        .await
        .unwrap();

    let report = harness
        .dispatcher
        .dispatch("issue_created", &json!({"id": 1}))
        .await;

    let delivery = report.for_subscription(sub.id).unwrap();
    assert_eq!(delivery.attempts, 3);
    assert_eq!(delivery.outcome, DeliveryOutcome::Delivered { status: 200 });
}

#[tokio::test]
async fn test_failing_subscriber_does_not_affect_others() {
    let harness = common::webhook_harness();
    let failing = common::subscriber("/hook", 500).await;
    let healthy = common::subscriber("/hook", 200).await;

    let failing_sub = harness
        .registry
        .register(RegisterWebhook::new(format!("{}/hook", failing.uri()), ["issue_created"]))
        .await
        .unwrap();
    let healthy_sub = harness
        .registry
        .register(RegisterWebhook::new(format!("{}/hook", healthy.uri()), ["issue_created"]))
        .await
        .unwrap();

    let report = harness
        .dispatcher
        .dispatch("issue_created", &json!({"id": 1}))
        .await;

    assert_eq!(report.delivered_count(), 1);
    assert_eq!(report.failed_count(), 1);
    assert!(report.for_subscription(healthy_sub.id).unwrap().is_delivered());
    assert_eq!(report.for_subscription(failing_sub.id).unwrap().attempts, 4);

    assert_eq!(received(&healthy).await.len(), 1);
    assert_eq!(received(&failing).await.len(), 4);
}

#[tokio::test]
async fn test_unavailable_registry_delivers_nothing() {
    let harness = common::webhook_harness();
    let server = common::subscriber("/hook", 200).await;
    harness
        .registry
        .register(RegisterWebhook::new(format!("{}/hook", server.uri()), ["issue_created"]))
        .await
        .unwrap();
    harness.repository.set_unavailable(true);

    harness
        .dispatcher
        .trigger("issue_created", &json!({"id": 1}))
        .await;

    let report = harness
        .dispatcher
        .dispatch("issue_created", &json!({"id": 1}))
        .await;
    assert!(report.lookup_failed);
    assert!(received(&server).await.is_empty());
}

#[tokio::test]
async fn test_inactive_subscription_is_skipped() {
    let harness = common::webhook_harness();
    let server = common::subscriber("/hook", 200).await;
    let sub = harness
        .registry
        .register(RegisterWebhook::new(format!("{}/hook", server.uri()), ["issue_created"]))
        .await
        .unwrap();

    harness.registry.set_active(sub.id, false).await.unwrap();
    harness
        .dispatcher
        .trigger("issue_created", &json!({"id": 1}))
        .await;
    assert!(received(&server).await.is_empty());

    harness.registry.set_active(sub.id, true).await.unwrap();
    harness
        .dispatcher
        .trigger("issue_created", &json!({"id": 1}))
        .await;
    assert_eq!(received(&server).await.len(), 1);
}

#[tokio::test]
async fn test_signed_delivery_verifies() {
    let harness = common::webhook_harness();
    let server = common::subscriber("/hook", 200).await;
    harness
        .registry
        .register(
            RegisterWebhook::new(format!("{}/hook", server.uri()), ["issue_updated"])
                .with_secret("s3cret"),
        )
        .await
        .unwrap();

    harness
        .dispatcher
        .trigger("issue_updated", &json!({"id": 7}))
        .await;

    let requests = received(&server).await;
    assert_eq!(requests.len(), 1);

    let signature = header(&requests[0], SIGNATURE_HEADER).expect("missing signature");
    assert!(verify_signature("s3cret", &requests[0].body, signature));
    assert!(!verify_signature("wrong", &requests[0].body, signature));
}

#[tokio::test]
async fn test_spawn_trigger_runs_in_background() {
    let harness = common::webhook_harness();
    let server = common::subscriber("/hook", 200).await;
    harness
        .registry
        .register(RegisterWebhook::new(format!("{}/hook", server.uri()), ["board_created"]))
        .await
        .unwrap();

    harness
        .dispatcher
        .spawn_trigger("board_created", json!({"name": "Sprint"}))
        .await
        .unwrap();

    let requests = received(&server).await;
    assert_eq!(requests.len(), 1);
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["board"], json!({"name": "Sprint"}));
}
