//! Integration tests for the order cache.
//!
//! # Running Tests
//!
//! ```bash
//! # In-memory pipeline tests (no external services)
//! cargo test -p order-cache-integration-tests
//!
//! # PostgreSQL-backed tests (needs a server; sqlx creates a database per test)
//! DATABASE_URL=postgres://localhost/postgres \
//!     cargo test -p order-cache-integration-tests -- --ignored
//! ```
//!
//! # Test Categories
//!
//! - `ingestion` - Bus to store to cache, end to end, on the in-memory doubles
//! - `postgres_store` - The `PostgreSQL` store against a real database

use std::sync::Arc;
use std::time::Duration;

use order_cache_service::bus::Bus;
use order_cache_service::testing::{MemoryBus, MemoryOrderStore};
use order_cache_service::{Ingestor, OrderCache, OrderQuery, OrderStore, RunStats};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How long [`Pipeline::wait_until`] waits before failing the test.
pub const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

/// A running ingestion loop over the in-memory bus and store.
pub struct Pipeline {
    pub bus: Arc<MemoryBus>,
    pub store: Arc<MemoryOrderStore>,
    pub cache: OrderCache,
    pub query: OrderQuery,
    shutdown: CancellationToken,
    task: JoinHandle<RunStats>,
}

impl Pipeline {
    /// Start ingesting from a fresh bus into `store`.
    ///
    /// # Panics
    ///
    /// Panics if the bus refuses the subscription.
    #[allow(clippy::expect_used)]
    pub async fn start(store: Arc<MemoryOrderStore>) -> Self {
        let bus = Arc::new(MemoryBus::new());
        let cache = OrderCache::new();
        let dyn_store: Arc<dyn OrderStore> = store.clone();
        let query = OrderQuery::new(cache.clone(), Arc::clone(&dyn_store));

        let subscription = bus.subscribe().await.expect("memory bus subscribes once");
        let shutdown = CancellationToken::new();
        let ingestor = Ingestor::new(dyn_store, cache.clone());
        let task = tokio::spawn({
            let shutdown = shutdown.clone();
            async move { ingestor.run(subscription, shutdown).await }
        });

        Self {
            bus,
            store,
            cache,
            query,
            shutdown,
            task,
        }
    }

    /// Poll `condition` until it holds.
    ///
    /// # Panics
    ///
    /// Panics if it does not hold within [`SETTLE_TIMEOUT`].
    pub async fn wait_until(&self, what: &str, condition: impl Fn(&Self) -> bool) {
        let deadline = tokio::time::Instant::now() + SETTLE_TIMEOUT;
        while !condition(self) {
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for {what}"
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Request shutdown and wait for the loop to finish.
    ///
    /// # Panics
    ///
    /// Panics if the ingestion task panicked.
    #[allow(clippy::expect_used)]
    pub async fn stop(self) -> RunStats {
        self.shutdown.cancel();
        self.task.await.expect("ingestion task panicked")
    }
}
