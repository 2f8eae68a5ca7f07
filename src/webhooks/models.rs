//! Webhook models
//!
//! Subscriptions, registration requests and the outbound delivery body.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use uuid::Uuid;

/// A registered webhook subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub id: Uuid,
    pub url: String,
    pub events: BTreeSet<String>,
    pub active: bool,
    pub secret: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    /// Active and subscribed to exactly this event name
    pub fn matches(&self, event_name: &str) -> bool {
        self.active && self.events.contains(event_name)
    }

    pub fn has_secret(&self) -> bool {
        self.secret.is_some()
    }
}

/// Request to register a webhook
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterWebhook {
    pub url: String,
    pub events: Vec<String>,
    #[serde(default)]
    pub secret: Option<String>,
}

impl RegisterWebhook {
    pub fn new<I, S>(url: impl Into<String>, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            url: url.into(),
            events: events.into_iter().map(Into::into).collect(),
            secret: None,
        }
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }
}

// =========================================================================
// Domain events
// =========================================================================

/// Entity kinds that emit events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Issue,
    Epic,
    Board,
}

impl EntityKind {
    /// Field name carrying the entity in a delivery body
    pub fn field(&self) -> &'static str {
        match self {
            EntityKind::Issue => "issue",
            EntityKind::Epic => "epic",
            EntityKind::Board => "board",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventAction {
    Created,
    Updated,
    Deleted,
}

impl EventAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventAction::Created => "created",
            EventAction::Updated => "updated",
            EventAction::Deleted => "deleted",
        }
    }
}

impl fmt::Display for EventAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event name for an entity mutation, e.g. `issue_created`
pub fn event_name(kind: EntityKind, action: EventAction) -> String {
    format!("{}_{}", kind.field(), action)
}

/// Entity field for an event name.
///
/// `epic_*` and `board_*` events carry their own field; everything else is
/// delivered under `issue`.
pub fn entity_field(event_name: &str) -> &'static str {
    let entity = ["_created", "_updated", "_deleted"]
        .iter()
        .find_map(|suffix| event_name.strip_suffix(suffix))
        .unwrap_or(event_name);

    match entity {
        "epic" => EntityKind::Epic.field(),
        "board" => EntityKind::Board.field(),
        _ => EntityKind::Issue.field(),
    }
}

/// JSON body POSTed to subscribers
pub fn webhook_body(event_name: &str, payload: Value) -> Value {
    let mut body = Map::new();
    body.insert(
        "webhookEvent".to_string(),
        Value::String(event_name.to_string()),
    );
    body.insert(entity_field(event_name).to_string(), payload);
    Value::Object(body)
}
