//! `PostgreSQL` order store tests.
//!
//! These tests require a running `PostgreSQL` server reachable through
//! `DATABASE_URL`; `sqlx::test` creates and migrates a fresh database for
//! each test.
//!
//! Run with: cargo test -p order-cache-integration-tests -- --ignored

#![allow(clippy::unwrap_used)]

use chrono::Timelike;
use order_cache_core::OrderUid;
use order_cache_service::OrderCache;
use order_cache_service::hydrate::hydrate;
use order_cache_service::store::{OrderStore, PgOrderStore, StoreError};
use order_cache_service::testing::sample_order;
use sqlx::PgPool;

async fn count(pool: &PgPool, table: &str, order_uid: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table} WHERE order_uid = $1"))
        .bind(order_uid)
        .fetch_one(pool)
        .await
        .unwrap()
}

/// Make every insert into `items` fail.
async fn reject_item_inserts(pool: &PgPool) {
    sqlx::query(
        r"
        CREATE FUNCTION reject_items() RETURNS trigger AS $$
        BEGIN
            RAISE EXCEPTION 'items insert rejected';
        END;
        $$ LANGUAGE plpgsql
        ",
    )
    .execute(pool)
    .await
    .unwrap();
    sqlx::query(
        "CREATE TRIGGER reject_items BEFORE INSERT ON items \
         FOR EACH ROW EXECUTE FUNCTION reject_items()",
    )
    .execute(pool)
    .await
    .unwrap();
}

#[sqlx::test(migrations = "../service/migrations")]
#[ignore = "Requires PostgreSQL (set DATABASE_URL)"]
async fn test_upsert_round_trip(pool: PgPool) {
    let store = PgOrderStore::new(pool);
    let order = sample_order("abc123", &[9_934_930, 1_000]);

    store.upsert(&order).await.unwrap();
    let loaded = store.load_by_id(&order.order_uid).await.unwrap().unwrap();

    assert_eq!(loaded, order);
}

#[sqlx::test(migrations = "../service/migrations")]
#[ignore = "Requires PostgreSQL (set DATABASE_URL)"]
async fn test_round_trip_keeps_microseconds(pool: PgPool) {
    let store = PgOrderStore::new(pool);
    let mut order = sample_order("precise", &[1]);
    order.date_created = order.date_created.with_nanosecond(123_456_789).unwrap();
    order.normalize();

    store.upsert(&order).await.unwrap();
    let loaded = store.load_by_id(&order.order_uid).await.unwrap().unwrap();

    assert_eq!(loaded.date_created.timestamp_subsec_nanos(), 123_456_000);
    assert_eq!(loaded, order);
}

#[sqlx::test(migrations = "../service/migrations")]
#[ignore = "Requires PostgreSQL (set DATABASE_URL)"]
async fn test_upsert_twice_equals_once(pool: PgPool) {
    let store = PgOrderStore::new(pool.clone());
    let order = sample_order("abc123", &[1, 2]);

    store.upsert(&order).await.unwrap();
    store.upsert(&order).await.unwrap();

    assert_eq!(count(&pool, "orders", "abc123").await, 1);
    assert_eq!(count(&pool, "deliveries", "abc123").await, 1);
    assert_eq!(count(&pool, "payments", "abc123").await, 1);
    assert_eq!(count(&pool, "items", "abc123").await, 2);
    assert_eq!(
        store.load_by_id(&order.order_uid).await.unwrap().unwrap(),
        order
    );
}

#[sqlx::test(migrations = "../service/migrations")]
#[ignore = "Requires PostgreSQL (set DATABASE_URL)"]
async fn test_redelivery_replaces_items(pool: PgPool) {
    let store = PgOrderStore::new(pool.clone());
    store.upsert(&sample_order("abc123", &[1, 2])).await.unwrap();

    let mut changed = sample_order("abc123", &[2, 3]);
    changed.delivery.city = "Haifa".to_string();
    store.upsert(&changed).await.unwrap();

    let loaded = store.load_by_id(&changed.order_uid).await.unwrap().unwrap();
    assert_eq!(loaded.chrt_ids(), vec![2, 3]);
    assert_eq!(loaded.delivery.city, "Haifa");
    assert_eq!(count(&pool, "items", "abc123").await, 2);
}

#[sqlx::test(migrations = "../service/migrations")]
#[ignore = "Requires PostgreSQL (set DATABASE_URL)"]
async fn test_failed_items_insert_writes_nothing(pool: PgPool) {
    reject_item_inserts(&pool).await;
    let store = PgOrderStore::new(pool.clone());

    let err = store
        .upsert(&sample_order("abc123", &[1]))
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::Database(_)));
    assert_eq!(count(&pool, "orders", "abc123").await, 0);
    assert_eq!(count(&pool, "deliveries", "abc123").await, 0);
    assert_eq!(count(&pool, "payments", "abc123").await, 0);
    assert_eq!(count(&pool, "items", "abc123").await, 0);
}

#[sqlx::test(migrations = "../service/migrations")]
#[ignore = "Requires PostgreSQL (set DATABASE_URL)"]
async fn test_failed_upsert_keeps_previous_version(pool: PgPool) {
    let store = PgOrderStore::new(pool.clone());
    let original = sample_order("abc123", &[1]);
    store.upsert(&original).await.unwrap();

    reject_item_inserts(&pool).await;
    let mut update = sample_order("abc123", &[2]);
    update.track_number = "CHANGED".to_string();
    assert!(store.upsert(&update).await.is_err());

    let loaded = store.load_by_id(&original.order_uid).await.unwrap().unwrap();
    assert_eq!(loaded, original);
}

#[sqlx::test(migrations = "../service/migrations")]
#[ignore = "Requires PostgreSQL (set DATABASE_URL)"]
async fn test_load_unknown_order(pool: PgPool) {
    let store = PgOrderStore::new(pool);
    let missing = OrderUid::parse("never-ingested").unwrap();
    assert!(store.load_by_id(&missing).await.unwrap().is_none());
}

#[sqlx::test(migrations = "../service/migrations")]
#[ignore = "Requires PostgreSQL (set DATABASE_URL)"]
async fn test_hydration_matches_store(pool: PgPool) {
    let store = PgOrderStore::new(pool);
    let orders = vec![
        sample_order("a", &[1, 2]),
        sample_order("b", &[3]),
        sample_order("c", &[]),
    ];
    for order in &orders {
        store.upsert(order).await.unwrap();
    }

    let cache = OrderCache::new();
    let report = hydrate(&store, &cache).await.unwrap();

    assert_eq!(report.loaded, 3);
    assert_eq!(report.skipped, 0);
    let snapshot: Vec<_> = cache.snapshot().iter().map(|o| (**o).clone()).collect();
    assert_eq!(snapshot, orders);
}

#[sqlx::test(migrations = "../service/migrations")]
#[ignore = "Requires PostgreSQL (set DATABASE_URL)"]
async fn test_order_without_payment_is_incomplete(pool: PgPool) {
    let store = PgOrderStore::new(pool.clone());
    store.upsert(&sample_order("good", &[1])).await.unwrap();
    store.upsert(&sample_order("broken", &[1])).await.unwrap();
    sqlx::query("DELETE FROM payments WHERE order_uid = 'broken'")
        .execute(&pool)
        .await
        .unwrap();

    let broken = OrderUid::parse("broken").unwrap();
    let err = store.load_by_id(&broken).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::Incomplete {
            missing: "payment",
            ..
        }
    ));

    let cache = OrderCache::new();
    let report = hydrate(&store, &cache).await.unwrap();
    assert_eq!(report.loaded, 1);
    assert_eq!(report.skipped, 1);
    assert!(cache.get("good").is_some());
    assert!(cache.get("broken").is_none());
}

#[sqlx::test(migrations = "../service/migrations")]
#[ignore = "Requires PostgreSQL (set DATABASE_URL)"]
async fn test_ping(pool: PgPool) {
    let store = PgOrderStore::new(pool);
    store.ping().await.unwrap();
}
