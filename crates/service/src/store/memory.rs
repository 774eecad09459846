//! In-memory order store for tests.
//!
//! Behaves like the `PostgreSQL` store at the aggregate level (whole-order
//! upserts, items replaced on re-delivery) and can be told to fail writes or
//! reads, or to hold a broken row, so failure paths can be exercised without
//! a database.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use order_cache_core::{Order, OrderUid};

use super::{OrderStore, StoreError};

enum StoredRow {
    Complete(Order),
    /// An `orders` row whose owned row is missing.
    Incomplete(&'static str),
}

/// Order store that keeps aggregates in a map.
#[derive(Default)]
pub struct MemoryOrderStore {
    rows: Mutex<BTreeMap<OrderUid, StoredRow>>,
    failing_upserts: AtomicU32,
    failing_reads: AtomicBool,
    upserts: AtomicUsize,
    closed: AtomicBool,
}

impl MemoryOrderStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `orders`.
    #[must_use]
    pub fn with_orders(orders: impl IntoIterator<Item = Order>) -> Self {
        let store = Self::new();
        {
            let mut rows = store.rows();
            for order in orders {
                rows.insert(order.order_uid.clone(), StoredRow::Complete(order));
            }
        }
        store
    }

    /// Make the next `count` upserts fail as if the database were unreachable.
    pub fn fail_next_upserts(&self, count: u32) {
        self.failing_upserts.store(count, Ordering::SeqCst);
    }

    /// Make every read fail as if the database were unreachable.
    pub fn fail_reads(&self, failing: bool) {
        self.failing_reads.store(failing, Ordering::SeqCst);
    }

    /// Store an order row whose `missing` row (e.g. `"delivery"`) is absent.
    pub fn insert_incomplete(&self, order_uid: OrderUid, missing: &'static str) {
        self.rows().insert(order_uid, StoredRow::Incomplete(missing));
    }

    /// Number of upsert calls, successful or not.
    #[must_use]
    pub fn upsert_calls(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    /// The complete order stored under `order_uid`, if any.
    #[must_use]
    pub fn stored(&self, order_uid: &str) -> Option<Order> {
        match self.rows().get(order_uid) {
            Some(StoredRow::Complete(order)) => Some(order.clone()),
            _ => None,
        }
    }

    /// Number of stored order rows, broken ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows().len()
    }

    /// Whether no order rows are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows().is_empty()
    }

    /// Whether `close` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn rows(&self) -> MutexGuard<'_, BTreeMap<OrderUid, StoredRow>> {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_upsert_failure(&self) -> bool {
        self.failing_upserts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn check_reads(&self) -> Result<(), StoreError> {
        if self.failing_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

fn resolve(order_uid: &OrderUid, row: &StoredRow) -> Result<Order, StoreError> {
    match row {
        StoredRow::Complete(order) => Ok(order.clone()),
        StoredRow::Incomplete(missing) => Err(StoreError::Incomplete {
            order_uid: order_uid.to_string(),
            missing: *missing,
        }),
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn upsert(&self, order: &Order) -> Result<(), StoreError> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        if self.take_upsert_failure() {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        self.rows()
            .insert(order.order_uid.clone(), StoredRow::Complete(order.clone()));
        Ok(())
    }

    fn load_all(&self) -> BoxStream<'_, Result<Order, StoreError>> {
        if let Err(e) = self.check_reads() {
            return stream::once(async move { Err(e) }).boxed();
        }
        let results: Vec<_> = self
            .rows()
            .iter()
            .map(|(order_uid, row)| resolve(order_uid, row))
            .collect();
        stream::iter(results).boxed()
    }

    async fn load_by_id(&self, order_uid: &OrderUid) -> Result<Option<Order>, StoreError> {
        self.check_reads()?;
        self.rows()
            .get(order_uid)
            .map(|row| resolve(order_uid, row))
            .transpose()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check_reads()
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
