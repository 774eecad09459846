//! Startup hydration of the cache from the durable store.

use futures::StreamExt;
use tracing::{info, instrument, warn};

use crate::cache::OrderCache;
use crate::store::{OrderStore, StoreError};

/// What hydration did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HydrationReport {
    /// Orders now in the cache.
    pub loaded: usize,
    /// Stored orders that could not be read back and were left out.
    pub skipped: usize,
}

/// Load every stored order into `cache`.
///
/// Must complete before ingestion starts and before the HTTP surface serves
/// reads. Orders that cannot be reassembled are logged and skipped.
///
/// # Errors
///
/// Returns the first store error that is not row-level (connectivity or a
/// failed query). The cache may then hold a partial load and should be
/// discarded.
#[instrument(skip_all)]
pub async fn hydrate(store: &dyn OrderStore, cache: &OrderCache) -> Result<HydrationReport, StoreError> {
    let mut report = HydrationReport::default();
    let mut orders = store.load_all();

    while let Some(result) = orders.next().await {
        match result {
            Ok(order) => {
                cache.put(order);
                report.loaded += 1;
            }
            Err(e) if e.is_row_level() => {
                warn!(error = %e, "Skipping stored order that cannot be loaded");
                report.skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }

    info!(
        loaded = report.loaded,
        skipped = report.skipped,
        "Cache hydrated from store"
    );
    Ok(report)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use order_cache_core::OrderUid;

    use super::*;
    use crate::testing::{MemoryOrderStore, sample_order};

    #[tokio::test]
    async fn test_hydrate_empty_store() {
        let store = MemoryOrderStore::new();
        let cache = OrderCache::new();
        let report = hydrate(&store, &cache).await.unwrap();
        assert_eq!(report, HydrationReport::default());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_hydrate_snapshot_matches_store() {
        let orders = vec![
            sample_order("a", &[1, 2]),
            sample_order("b", &[3]),
            sample_order("c", &[]),
        ];
        let store = MemoryOrderStore::with_orders(orders.clone());
        let cache = OrderCache::new();

        let report = hydrate(&store, &cache).await.unwrap();
        assert_eq!(report.loaded, 3);

        let snapshot: Vec<_> = cache.snapshot().iter().map(|o| (**o).clone()).collect();
        assert_eq!(snapshot, orders);
    }

    #[tokio::test]
    async fn test_hydrate_skips_incomplete_orders() {
        let store = MemoryOrderStore::with_orders([sample_order("good", &[1])]);
        store.insert_incomplete(OrderUid::parse("broken").unwrap(), "payment");
        let cache = OrderCache::new();

        let report = hydrate(&store, &cache).await.unwrap();
        assert_eq!(report, HydrationReport { loaded: 1, skipped: 1 });
        assert!(cache.get("good").is_some());
        assert!(cache.get("broken").is_none());
    }

    #[tokio::test]
    async fn test_hydrate_fails_when_store_unreachable() {
        let store = MemoryOrderStore::with_orders([sample_order("a", &[1])]);
        store.fail_reads(true);
        let cache = OrderCache::new();

        let err = hydrate(&store, &cache).await.unwrap_err();
        assert!(matches!(err, StoreError::Database(_)));
    }
}
