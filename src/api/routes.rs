//! API Routes
//!
//! HTTP endpoints for managing webhook subscriptions.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppResult;
use crate::webhooks::{RegisterWebhook, Subscription, WebhookRegistry};

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterWebhookRequest {
    pub url: String,
    pub events: Vec<String>,
    #[serde(default)]
    pub secret: Option<String>,
}

impl From<RegisterWebhookRequest> for RegisterWebhook {
    fn from(request: RegisterWebhookRequest) -> Self {
        let registration = RegisterWebhook::new(request.url, request.events);
        match request.secret {
            Some(secret) => registration.with_secret(secret),
            None => registration,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateWebhookRequest {
    pub active: bool,
}

/// Subscription as shown to API clients; the secret never leaves the server
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub id: Uuid,
    pub url: String,
    pub events: Vec<String>,
    pub active: bool,
    pub has_secret: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Subscription> for WebhookResponse {
    fn from(subscription: Subscription) -> Self {
        let has_secret = subscription.has_secret();
        Self {
            id: subscription.id,
            url: subscription.url,
            events: subscription.events.into_iter().collect(),
            active: subscription.active,
            has_secret,
            created_at: subscription.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WebhookListResponse {
    pub webhooks: Vec<WebhookResponse>,
    pub total: usize,
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router
pub fn create_router() -> Router<WebhookRegistry> {
    Router::new()
        .route("/webhooks", get(list_webhooks).post(register_webhook))
        .route(
            "/webhooks/:webhook_id",
            patch(update_webhook).delete(delete_webhook),
        )
}

// =========================================================================
// POST /webhooks
// =========================================================================

async fn register_webhook(
    State(registry): State<WebhookRegistry>,
    Json(request): Json<RegisterWebhookRequest>,
) -> AppResult<(StatusCode, Json<WebhookResponse>)> {
    let subscription = registry.register(request.into()).await?;

    Ok((StatusCode::CREATED, Json(subscription.into())))
}

// =========================================================================
// GET /webhooks
// =========================================================================

async fn list_webhooks(
    State(registry): State<WebhookRegistry>,
) -> AppResult<Json<WebhookListResponse>> {
    let webhooks: Vec<WebhookResponse> = registry
        .list()
        .await?
        .into_iter()
        .map(WebhookResponse::from)
        .collect();

    Ok(Json(WebhookListResponse {
        total: webhooks.len(),
        webhooks,
    }))
}

// =========================================================================
// PATCH /webhooks/:webhook_id
// =========================================================================

/// Pause or resume deliveries to a subscription
async fn update_webhook(
    State(registry): State<WebhookRegistry>,
    Path(webhook_id): Path<Uuid>,
    Json(request): Json<UpdateWebhookRequest>,
) -> AppResult<Json<WebhookResponse>> {
    let subscription = registry.set_active(webhook_id, request.active).await?;
    Ok(Json(subscription.into()))
}

// =========================================================================
// DELETE /webhooks/:webhook_id
// =========================================================================

async fn delete_webhook(
    State(registry): State<WebhookRegistry>,
    Path(webhook_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    registry.remove(webhook_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
