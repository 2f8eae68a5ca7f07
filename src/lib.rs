//! tracker_core Library
//!
//! Issue key allocation and outbound webhooks for the tracker backend.
//! Re-exports modules for integration testing and the binaries.

pub mod api;
pub mod config;
pub mod context;
pub mod db;
mod error;
pub mod keys;
pub mod webhooks;

pub use config::Config;
pub use context::{AppContext, ContextError};
pub use error::{AppError, AppResult, ErrorResponse};
pub use keys::{AllocationError, KeyAllocator, KeyPrefix};
pub use webhooks::{WebhookDispatcher, WebhookRegistry};
