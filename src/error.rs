//! Error handling module
//!
//! Centralized error types and HTTP response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::db::StoreError;
use crate::keys::AllocationError;
use crate::webhooks::WebhookError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Webhook not found: {0}")]
    WebhookNotFound(String),

    // Server errors (5xx)
    #[error("Storage unavailable")]
    Unavailable(String),

    #[error("Storage error: {0}")]
    Store(StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        if e.is_connection_error() {
            AppError::Unavailable(e.to_string())
        } else {
            AppError::Store(e)
        }
    }
}

impl From<WebhookError> for AppError {
    fn from(e: WebhookError) -> Self {
        match e {
            WebhookError::Validation(msg) => AppError::InvalidRequest(msg),
            WebhookError::NotFound(id) => AppError::WebhookNotFound(id.to_string()),
            WebhookError::Store(e) => e.into(),
        }
    }
}

impl From<AllocationError> for AppError {
    fn from(e: AllocationError) -> Self {
        match e {
            AllocationError::InvalidPrefix(_) => AppError::InvalidRequest(e.to_string()),
            AllocationError::Store(e) => e.into(),
            e if e.is_retryable() => AppError::Unavailable(e.to_string()),
            e => AppError::Internal(e.to_string()),
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, details) = match &self {
            // 400 Bad Request
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", Some(msg.clone()))
            }

            // 404 Not Found
            AppError::WebhookNotFound(id) => {
                (StatusCode::NOT_FOUND, "webhook_not_found", Some(id.clone()))
            }

            // 503 Service Unavailable
            AppError::Unavailable(msg) => {
                tracing::warn!("Storage unavailable: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, "unavailable", None)
            }

            // 500 Internal Server Error
            AppError::Store(e) => {
                tracing::error!("Storage error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "storage_error", None)
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: self.to_string(),
            error_code: error_code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ConnectionError;
    use uuid::Uuid;

    #[test]
    fn test_webhook_errors_map_to_status() {
        let cases = [
            (WebhookError::Validation("bad url".into()), StatusCode::BAD_REQUEST),
            (WebhookError::NotFound(Uuid::new_v4()), StatusCode::NOT_FOUND),
            (
                WebhookError::Store(ConnectionError::Connect("refused".into()).into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                WebhookError::Store(StoreError::Other("boom".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            let response = AppError::from(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }

    #[tokio::test]
    async fn test_error_codes_in_body() {
        let cases = [
            (AppError::InvalidRequest("x".into()), StatusCode::BAD_REQUEST, "invalid_request"),
            (AppError::WebhookNotFound("id".into()), StatusCode::NOT_FOUND, "webhook_not_found"),
            (AppError::Unavailable("down".into()), StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
            (
                AppError::Store(StoreError::Other("boom".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
                "storage_error",
            ),
            (AppError::Internal("oops".into()), StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        ];

        for (err, status, code) in cases {
            let response = err.into_response();
            assert_eq!(response.status(), status);

            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(body["error_code"], code);
        }
    }

    #[test]
    fn test_invalid_prefix_is_bad_request() {
        let err: AppError = AllocationError::InvalidPrefix("".into()).into();
        assert!(matches!(err, AppError::InvalidRequest(_)));
    }
}
