//! Webhook Errors

use uuid::Uuid;

use crate::db::StoreError;

use super::retry::Retryable;

/// Registry errors
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// Malformed registration, rejected before persistence
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Webhook not found: {0}")]
    NotFound(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A single failed delivery attempt. Never surfaced by `trigger`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Delivery timed out")]
    Timeout,

    #[error("Subscriber responded with HTTP {0}")]
    Status(u16),
}

impl Retryable for DeliveryError {
    fn is_retryable(&self) -> bool {
        match self {
            DeliveryError::Network(_) | DeliveryError::Timeout => true,
            DeliveryError::Status(status) => *status >= 500,
        }
    }
}

impl From<reqwest::Error> for DeliveryError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            DeliveryError::Timeout
        } else {
            DeliveryError::Network(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_error_retryable() {
        assert!(DeliveryError::Network("refused".to_string()).is_retryable());
        assert!(DeliveryError::Timeout.is_retryable());
        assert!(DeliveryError::Status(500).is_retryable());
        assert!(DeliveryError::Status(503).is_retryable());
        assert!(!DeliveryError::Status(400).is_retryable());
        assert!(!DeliveryError::Status(404).is_retryable());
        assert!(!DeliveryError::Status(410).is_retryable());
    }

    #[test]
    fn test_webhook_error_display() {
        let err = WebhookError::Validation("events must not be empty".to_string());
        assert!(err.to_string().contains("events must not be empty"));

        let err = WebhookError::NotFound(Uuid::nil());
        assert!(err.to_string().contains("not found"));
    }
}
