//! Durable store gateway for order aggregates.
//!
//! # Database
//!
//! ## Tables
//!
//! - `orders` - Aggregate root, keyed by `order_uid`
//! - `deliveries` - One row per order, keyed by `order_uid`
//! - `payments` - One row per order, keyed by `order_uid`
//! - `items` - N rows per order, keyed by (`order_uid`, `chrt_id`)
//!
//! # Schema
//!
//! The schema lives in `crates/service/migrations/` and is applied by the
//! operator (e.g. `sqlx migrate run --source crates/service/migrations`). The
//! service never migrates on its own.

#[cfg(any(test, feature = "testing"))]
pub mod memory;
pub mod postgres;

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use order_cache_core::{Order, OrderUid};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

#[cfg(any(test, feature = "testing"))]
pub use memory::MemoryOrderStore;
pub use postgres::PgOrderStore;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from sqlx (connectivity, query, or a failed transaction).
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored order is missing one of its owned rows.
    #[error("order {order_uid} has no {missing} row")]
    Incomplete {
        order_uid: String,
        missing: &'static str,
    },

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),
}

impl StoreError {
    /// Whether the error concerns a single stored order rather than the store.
    ///
    /// Row-level errors are skipped during hydration; everything else is fatal.
    #[must_use]
    pub const fn is_row_level(&self) -> bool {
        matches!(self, Self::Incomplete { .. } | Self::DataCorruption(_))
    }
}

/// Transactional persistence and retrieval of whole order aggregates.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Write the order and its delivery, payment, and items as one atomic unit.
    ///
    /// Re-applying the same order leaves the stored state unchanged. Items no
    /// longer present in `order` are removed in the same transaction.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Database` if any statement fails; nothing is written.
    async fn upsert(&self, order: &Order) -> Result<(), StoreError>;

    /// Stream every stored order, fully hydrated.
    ///
    /// Row-level problems are yielded as errors for which
    /// [`StoreError::is_row_level`] holds and the stream goes on; any other
    /// error ends the stream.
    fn load_all(&self) -> BoxStream<'_, Result<Order, StoreError>>;

    /// Fetch one fully hydrated order.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Incomplete` if the order exists without its
    /// delivery or payment, and `StoreError::Database` if the query fails.
    async fn load_by_id(&self, order_uid: &OrderUid) -> Result<Option<Order>, StoreError>;

    /// Check that the store is reachable.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Database` if the store does not answer.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Release the underlying connections once in-flight work has completed.
    async fn close(&self);
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_level_classification() {
        assert!(
            StoreError::Incomplete {
                order_uid: "abc".to_string(),
                missing: "payment",
            }
            .is_row_level()
        );
        assert!(StoreError::DataCorruption("bad".to_string()).is_row_level());
        assert!(!StoreError::Database(sqlx::Error::PoolTimedOut).is_row_level());
    }

    #[test]
    fn test_incomplete_display() {
        let err = StoreError::Incomplete {
            order_uid: "abc".to_string(),
            missing: "delivery",
        };
        assert_eq!(err.to_string(), "order abc has no delivery row");
    }
}
