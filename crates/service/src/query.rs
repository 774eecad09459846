//! Read boundary over the cache.

use std::sync::Arc;

use order_cache_core::{Order, OrderUid};
use tracing::debug;

use crate::cache::OrderCache;
use crate::store::{OrderStore, StoreError};

/// Order lookups for the HTTP surface.
///
/// Reads are served from the cache. A miss falls back to the store, and a
/// hit there repopulates the cache.
#[derive(Clone)]
pub struct OrderQuery {
    cache: OrderCache,
    store: Arc<dyn OrderStore>,
}

impl OrderQuery {
    #[must_use]
    pub fn new(cache: OrderCache, store: Arc<dyn OrderStore>) -> Self {
        Self { cache, store }
    }

    /// Look up one order.
    ///
    /// # Errors
    ///
    /// Returns a `StoreError` only when the cache misses and the store read
    /// fails.
    pub async fn get_by_id(&self, order_uid: &str) -> Result<Option<Arc<Order>>, StoreError> {
        if let Some(order) = self.cache.get(order_uid) {
            return Ok(Some(order));
        }

        // A blank id can never have been stored.
        let Ok(order_uid) = OrderUid::parse(order_uid) else {
            return Ok(None);
        };

        match self.store.load_by_id(&order_uid).await? {
            Some(order) => {
                debug!(order_uid = %order_uid, "Cache miss served from store");
                Ok(Some(self.cache.put_if_absent(order)))
            }
            None => Ok(None),
        }
    }

    /// Every cached order, sorted by `order_uid`.
    #[must_use]
    pub fn list_all(&self) -> Vec<Arc<Order>> {
        self.cache.snapshot()
    }

    /// Check that the store behind the cache answers.
    ///
    /// # Errors
    ///
    /// Returns the store's error if it does not.
    pub async fn ping_store(&self) -> Result<(), StoreError> {
        self.store.ping().await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testing::{MemoryOrderStore, sample_order};

    fn query(store: &Arc<MemoryOrderStore>) -> (OrderQuery, OrderCache) {
        let cache = OrderCache::new();
        (OrderQuery::new(cache.clone(), store.clone()), cache)
    }

    #[tokio::test]
    async fn test_cache_hit_skips_store() {
        let store = Arc::new(MemoryOrderStore::new());
        store.fail_reads(true);
        let (query, cache) = query(&store);
        cache.put(sample_order("abc123", &[1, 2]));

        let order = query.get_by_id("abc123").await.unwrap().unwrap();
        assert_eq!(order.items.len(), 2);
    }

    #[tokio::test]
    async fn test_miss_reads_through_and_repopulates() {
        let store = Arc::new(MemoryOrderStore::with_orders([sample_order("abc123", &[1])]));
        let (query, cache) = query(&store);

        let order = query.get_by_id("abc123").await.unwrap().unwrap();
        assert_eq!(order.chrt_ids(), vec![1]);
        assert!(cache.get("abc123").is_some());
    }

    #[tokio::test]
    async fn test_unknown_id_returns_none() {
        let store = Arc::new(MemoryOrderStore::new());
        let (query, cache) = query(&store);

        assert!(query.get_by_id("never-ingested").await.unwrap().is_none());
        assert!(query.get_by_id("").await.unwrap().is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_miss_with_store_down_is_error() {
        let store = Arc::new(MemoryOrderStore::new());
        store.fail_reads(true);
        let (query, _cache) = query(&store);

        assert!(query.get_by_id("abc123").await.is_err());
    }

    #[tokio::test]
    async fn test_list_all_reads_cache_only() {
        let store = Arc::new(MemoryOrderStore::with_orders([sample_order("stored", &[1])]));
        let (query, cache) = query(&store);
        cache.put(sample_order("b", &[1]));
        cache.put(sample_order("a", &[1]));

        let ids: Vec<_> = query
            .list_all()
            .iter()
            .map(|o| o.order_uid.to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
