//! In-memory read cache of order aggregates.
//!
//! The ingestion task writes while HTTP handlers read, so the map sits behind
//! a `RwLock`. Entries are immutable `Arc<Order>`s: a writer replaces the
//! whole pointer, which means a reader holding an entry can never see a
//! partially updated order.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use order_cache_core::{Order, OrderUid};

/// Concurrent map from `order_uid` to order.
///
/// This struct is cheaply cloneable via `Arc`; clones share the same map.
#[derive(Clone, Default)]
pub struct OrderCache {
    inner: Arc<RwLock<HashMap<OrderUid, Arc<Order>>>>,
}

impl OrderCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for `order.order_uid`. Last writer wins.
    pub fn put(&self, order: Order) -> Arc<Order> {
        let order = Arc::new(order);
        self.write()
            .insert(order.order_uid.clone(), Arc::clone(&order));
        order
    }

    /// Insert `order` only if nothing is cached under its id yet.
    ///
    /// Returns whichever entry is cached afterwards. Read-through fills use
    /// this so a value read from the store before an ingestion `put` can never
    /// overwrite what that `put` published.
    pub fn put_if_absent(&self, order: Order) -> Arc<Order> {
        let mut map = self.write();
        Arc::clone(
            map.entry(order.order_uid.clone())
                .or_insert_with(|| Arc::new(order)),
        )
    }

    /// Look up an order. Never blocks on I/O.
    #[must_use]
    pub fn get(&self, order_uid: &str) -> Option<Arc<Order>> {
        self.read().get(order_uid).cloned()
    }

    /// Point-in-time copy of every entry, sorted by `order_uid`.
    ///
    /// Taken under a single read lock, so it reflects either all or none of
    /// any concurrent `put`.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<Order>> {
        let mut orders: Vec<_> = self.read().values().cloned().collect();
        orders.sort_by(|a, b| a.order_uid.cmp(&b.order_uid));
        orders
    }

    /// Number of cached orders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    // A panic while holding the lock cannot leave a half-written entry behind
    // (values are swapped whole), so a poisoned lock is still safe to use.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<OrderUid, Arc<Order>>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<OrderUid, Arc<Order>>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::thread;

    use super::*;
    use crate::testing::sample_order;

    #[test]
    fn test_get_missing_returns_none() {
        let cache = OrderCache::new();
        assert!(cache.get("nope").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_put_then_get() {
        let cache = OrderCache::new();
        cache.put(sample_order("abc123", &[1, 2]));
        let order = cache.get("abc123").unwrap();
        assert_eq!(order.items.len(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_put_replaces() {
        let cache = OrderCache::new();
        cache.put(sample_order("abc123", &[1, 2]));
        cache.put(sample_order("abc123", &[3]));
        assert_eq!(cache.get("abc123").unwrap().chrt_ids(), vec![3]);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_put_if_absent_keeps_existing() {
        let cache = OrderCache::new();
        cache.put(sample_order("abc123", &[1, 2]));
        let kept = cache.put_if_absent(sample_order("abc123", &[9]));
        assert_eq!(kept.chrt_ids(), vec![1, 2]);
        assert_eq!(cache.get("abc123").unwrap().chrt_ids(), vec![1, 2]);
    }

    #[test]
    fn test_put_if_absent_inserts_when_missing() {
        let cache = OrderCache::new();
        let inserted = cache.put_if_absent(sample_order("abc123", &[9]));
        assert_eq!(inserted.chrt_ids(), vec![9]);
        assert!(cache.get("abc123").is_some());
    }

    #[test]
    fn test_snapshot_is_sorted_and_detached() {
        let cache = OrderCache::new();
        cache.put(sample_order("b", &[1]));
        cache.put(sample_order("a", &[1]));
        let snapshot = cache.snapshot();
        cache.put(sample_order("c", &[1]));

        let ids: Vec<_> = snapshot.iter().map(|o| o.order_uid.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_clones_share_entries() {
        let cache = OrderCache::new();
        let handle = cache.clone();
        handle.put(sample_order("abc123", &[1]));
        assert!(cache.get("abc123").is_some());
    }

    #[test]
    fn test_concurrent_readers_never_see_torn_orders() {
        // Every version written keeps items and payment.goods_total in step;
        // a torn read would break the relation.
        fn version(n: i64) -> Order {
            let chrt_ids: Vec<i64> = (0..=n % 5).collect();
            let mut order = sample_order("hot", &chrt_ids);
            order.payment.goods_total = i64::try_from(order.items.len()).unwrap();
            order.track_number = format!("v{n}");
            order
        }
        fn consistent(order: &Order) -> bool {
            i64::try_from(order.items.len()).unwrap() == order.payment.goods_total
        }

        let cache = OrderCache::new();
        cache.put(version(0));

        let writer = {
            let cache = cache.clone();
            thread::spawn(move || {
                for n in 1..2_000 {
                    cache.put(version(n));
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let cache = cache.clone();
                thread::spawn(move || {
                    for _ in 0..2_000 {
                        let order = cache.get("hot").unwrap();
                        assert!(consistent(&order));
                        for order in cache.snapshot() {
                            assert!(consistent(&order));
                        }
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(cache.get("hot").unwrap().track_number, "v1999");
    }
}
