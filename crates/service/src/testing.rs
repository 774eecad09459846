//! Fixtures and in-memory doubles for tests.
//!
//! Enabled for this crate's unit tests and, through the `testing` feature,
//! for the integration tests crate.

use chrono::{TimeZone, Utc};
use order_cache_core::{Delivery, Item, Order, OrderUid, Payment};

pub use crate::bus::{MemoryBus, MemorySubscription};
pub use crate::store::MemoryOrderStore;

/// A complete, normalized order with one item per `chrt_id`.
///
/// # Panics
///
/// Panics if `order_uid` is blank.
#[must_use]
#[allow(clippy::expect_used)]
pub fn sample_order(order_uid: &str, chrt_ids: &[i64]) -> Order {
    let items: Vec<Item> = chrt_ids
        .iter()
        .map(|&chrt_id| Item {
            chrt_id,
            track_number: "WBILMTESTTRACK".to_string(),
            price: 453,
            rid: format!("rid-{chrt_id}"),
            name: "Mascaras".to_string(),
            sale: 30,
            size: "0".to_string(),
            total_price: 317,
            nm_id: 2_389_212,
            brand: "Vivienne Sabo".to_string(),
            status: 202,
        })
        .collect();

    let mut order = Order {
        order_uid: OrderUid::parse(order_uid).expect("sample order_uid must not be blank"),
        track_number: "WBILMTESTTRACK".to_string(),
        entry: "WBIL".to_string(),
        delivery: Delivery {
            name: "Test Testov".to_string(),
            phone: "+9720000000".to_string(),
            zip: "2639809".to_string(),
            city: "Kiryat Mozkin".to_string(),
            address: "Ploshad Mira 15".to_string(),
            region: "Kraiot".to_string(),
            email: "test@gmail.com".to_string(),
        },
        payment: Payment {
            transaction: order_uid.to_string(),
            request_id: String::new(),
            currency: "USD".to_string(),
            provider: "wbpay".to_string(),
            amount: 1817,
            payment_dt: 1_637_907_727,
            bank: "alpha".to_string(),
            delivery_cost: 1500,
            goods_total: 317,
            custom_fee: 0,
        },
        items,
        locale: "en".to_string(),
        internal_signature: String::new(),
        customer_id: "test".to_string(),
        delivery_service: "meest".to_string(),
        shardkey: "9".to_string(),
        sm_id: 99,
        date_created: Utc
            .with_ymd_and_hms(2021, 11, 26, 6, 22, 19)
            .single()
            .expect("fixed timestamp is unambiguous"),
        oof_shard: "1".to_string(),
    };
    order.normalize();
    order
}

/// [`sample_order`] serialized as a bus payload.
///
/// # Panics
///
/// Panics if `order_uid` is blank.
#[must_use]
#[allow(clippy::expect_used)]
pub fn sample_payload(order_uid: &str, chrt_ids: &[i64]) -> Vec<u8> {
    serde_json::to_vec(&sample_order(order_uid, chrt_ids)).expect("orders always serialize")
}
