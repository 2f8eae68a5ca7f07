//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::keys::DEFAULT_COUNTER;
use crate::webhooks::{DispatcherConfig, RetryPolicy};

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    /// Settings key holding the shared key counter
    pub key_counter_name: String,

    /// Webhook delivery attempts, including the first
    pub webhook_max_attempts: u32,

    pub webhook_retry_delay: Duration,

    pub webhook_max_retry_delay: Duration,

    /// Per-attempt request timeout
    pub webhook_timeout: Duration,

    pub webhook_connect_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from any variable source
    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = get("DATABASE_URL").ok_or(ConfigError::MissingEnv("DATABASE_URL"))?;

        let database_max_connections = parse_var(&get, "DATABASE_MAX_CONNECTIONS", 10)?;

        let host = get("HOST").unwrap_or_else(|| "127.0.0.1".to_string());

        let port = parse_var(&get, "PORT", 3000)?;

        let environment = get("ENVIRONMENT").unwrap_or_else(|| "development".to_string());

        let key_counter_name =
            get("KEY_COUNTER_NAME").unwrap_or_else(|| DEFAULT_COUNTER.to_string());
        if key_counter_name.trim().is_empty() {
            return Err(ConfigError::InvalidValue("KEY_COUNTER_NAME"));
        }

        let webhook_max_attempts: u32 = parse_var(&get, "WEBHOOK_MAX_ATTEMPTS", 4)?;
        if webhook_max_attempts == 0 {
            return Err(ConfigError::InvalidValue("WEBHOOK_MAX_ATTEMPTS"));
        }

        let webhook_retry_delay =
            Duration::from_millis(parse_var(&get, "WEBHOOK_RETRY_DELAY_MS", 1000)?);
        let webhook_max_retry_delay =
            Duration::from_millis(parse_var(&get, "WEBHOOK_MAX_RETRY_DELAY_MS", 30_000)?);
        let webhook_timeout = Duration::from_secs(parse_var(&get, "WEBHOOK_TIMEOUT_SECS", 10)?);
        let webhook_connect_timeout =
            Duration::from_secs(parse_var(&get, "WEBHOOK_CONNECT_TIMEOUT_SECS", 5)?);

        Ok(Self {
            database_url,
            database_max_connections,
            host,
            port,
            environment,
            key_counter_name,
            webhook_max_attempts,
            webhook_retry_delay,
            webhook_max_retry_delay,
            webhook_timeout,
            webhook_connect_timeout,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.webhook_max_attempts, self.webhook_retry_delay)
            .with_max_delay(self.webhook_max_retry_delay)
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            retry: self.retry_policy(),
            request_timeout: self.webhook_timeout,
            connect_timeout: self.webhook_connect_timeout,
            ..Default::default()
        }
    }
}

/// Read an optional variable, falling back to `default` when unset
fn parse_var<F, T>(get: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match get(name) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue(name)),
        None => Ok(default),
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
