//! Service configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `ORDER_CACHE_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//!
//! ## Optional
//! - `ORDER_CACHE_HOST` - Bind address (default: 127.0.0.1)
//! - `ORDER_CACHE_PORT` - Listen port (default: 8080)
//! - `NATS_URL` - NATS server (default: `nats://localhost:4222`)
//! - `NATS_STREAM` - `JetStream` stream name (default: ORDERS)
//! - `NATS_SUBJECT` - Subject orders are published on (default: new-orders)
//! - `NATS_CLIENT_ID` - Connection name (default: service-client)
//! - `NATS_CONSUMER` - Durable consumer name (default: order-cache)
//! - `NATS_ACK_WAIT_SECS` - Redelivery delay for unacknowledged messages (default: 30)
//! - `NATS_CONNECT_RETRY_SECS` - Wait between connection attempts (default: 5)
//! - `NATS_CONNECT_MAX_ATTEMPTS` - Give up after this many attempts (default: retry forever)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment tag

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

use crate::retry::RetryPolicy;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Order cache service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Message bus configuration
    pub bus: BusConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment tag
    pub sentry_environment: Option<String>,
}

/// NATS `JetStream` configuration.
///
/// Implements `Debug` manually to redact URL credentials.
#[derive(Clone)]
pub struct BusConfig {
    /// Server URL, may carry credentials
    pub url: Url,
    /// Stream holding the orders subject
    pub stream: String,
    /// Subject orders are published on
    pub subject: String,
    /// Connection name
    pub client_id: String,
    /// Durable consumer name
    pub consumer: String,
    /// How long the server waits for an ack before redelivering
    pub ack_wait: Duration,
    /// Wait between connection attempts
    pub connect_retry_interval: Duration,
    /// Attempt cap for connecting, `None` to retry forever
    pub connect_max_attempts: Option<u32>,
}

impl std::fmt::Debug for BusConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusConfig")
            .field("url", &self.redacted_url())
            .field("stream", &self.stream)
            .field("subject", &self.subject)
            .field("client_id", &self.client_id)
            .field("consumer", &self.consumer)
            .field("ack_wait", &self.ack_wait)
            .field("connect_retry_interval", &self.connect_retry_interval)
            .field("connect_max_attempts", &self.connect_max_attempts)
            .finish()
    }
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);

        let database_url = env.database_url("ORDER_CACHE_DATABASE_URL")?;
        let host = env.parsed("ORDER_CACHE_HOST", "127.0.0.1")?;
        let port = env.parsed("ORDER_CACHE_PORT", "8080")?;
        let bus = BusConfig::from_env(&env)?;

        Ok(Self {
            database_url,
            host,
            port,
            bus,
            sentry_dsn: env.optional("SENTRY_DSN"),
            sentry_environment: env.optional("SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl BusConfig {
    /// Load only the bus settings, for tools that need no database.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let lookup = |key: &str| std::env::var(key).ok();
        Self::from_env(&Env(&lookup))
    }

    fn from_env(env: &Env<'_>) -> Result<Self, ConfigError> {
        let url = env.parsed("NATS_URL", "nats://localhost:4222")?;
        let ack_wait = Duration::from_secs(env.parsed("NATS_ACK_WAIT_SECS", "30")?);
        let connect_retry_interval =
            Duration::from_secs(env.parsed("NATS_CONNECT_RETRY_SECS", "5")?);
        let connect_max_attempts = env
            .optional("NATS_CONNECT_MAX_ATTEMPTS")
            .map(|value| parse_value::<u32>("NATS_CONNECT_MAX_ATTEMPTS", &value))
            .transpose()?;

        Ok(Self {
            url,
            stream: env.or_default("NATS_STREAM", "ORDERS"),
            subject: env.or_default("NATS_SUBJECT", "new-orders"),
            client_id: env.or_default("NATS_CLIENT_ID", "service-client"),
            consumer: env.or_default("NATS_CONSUMER", "order-cache"),
            ack_wait,
            connect_retry_interval,
            connect_max_attempts,
        })
    }

    /// The policy used while connecting to the bus.
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        let policy = RetryPolicy::fixed(self.connect_retry_interval);
        match self.connect_max_attempts {
            Some(max) => policy.with_max_attempts(max),
            None => policy,
        }
    }

    /// The server URL with any password masked, safe to log.
    #[must_use]
    pub fn redacted_url(&self) -> String {
        let mut url = self.url.clone();
        if url.password().is_some() {
            let _ = url.set_password(Some("REDACTED"));
        }
        url.to_string()
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

struct Env<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Env<'_> {
    /// Get a required variable.
    fn required(&self, key: &str) -> Result<String, ConfigError> {
        (self.0)(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    /// Get database URL with fallback to generic `DATABASE_URL`.
    fn database_url(&self, primary_key: &str) -> Result<SecretString, ConfigError> {
        self.required(primary_key)
            .or_else(|_| self.required("DATABASE_URL"))
            .map(SecretString::from)
            .map_err(|_| ConfigError::MissingEnvVar(primary_key.to_string()))
    }

    /// Get an optional variable. Blank values count as unset.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|value| !value.trim().is_empty())
    }

    /// Get a variable with a default value.
    fn or_default(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    /// Get a variable with a default value and parse it.
    fn parsed<T>(&self, key: &str, default: &str) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        parse_value(key, &self.or_default(key, default))
    }
}

fn parse_value<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}
