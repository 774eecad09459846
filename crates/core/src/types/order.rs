//! The order aggregate.
//!
//! An [`Order`] owns exactly one [`Delivery`], exactly one [`Payment`], and a
//! set of [`Item`]s. The aggregate is persisted and cached as one consistency
//! unit: there is no valid state in which an order exists without its delivery
//! or payment.

use std::collections::HashSet;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use super::OrderUid;

/// Structural problems that make an order impossible to store faithfully.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderError {
    /// Two items in the same order share a `chrt_id`.
    #[error("duplicate item chrt_id {chrt_id}")]
    DuplicateItem {
        /// The repeated item identifier.
        chrt_id: i64,
    },
}

/// An order and everything it owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub order_uid: OrderUid,
    pub track_number: String,
    pub entry: String,
    pub delivery: Delivery,
    pub payment: Payment,
    pub items: Vec<Item>,
    pub locale: String,
    pub internal_signature: String,
    pub customer_id: String,
    pub delivery_service: String,
    pub shardkey: String,
    pub sm_id: i32,
    pub date_created: DateTime<Utc>,
    pub oof_shard: String,
}

/// Delivery address and recipient contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct Delivery {
    pub name: String,
    pub phone: String,
    pub zip: String,
    pub city: String,
    pub address: String,
    pub region: String,
    pub email: String,
}

/// Payment details. Amounts are integer minor units; `payment_dt` is epoch seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct Payment {
    pub transaction: String,
    pub request_id: String,
    pub currency: String,
    pub provider: String,
    pub amount: i64,
    pub payment_dt: i64,
    pub bank: String,
    pub delivery_cost: i64,
    pub goods_total: i64,
    pub custom_fee: i64,
}

/// A line item. Unique within its order by `chrt_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct Item {
    pub chrt_id: i64,
    pub track_number: String,
    pub price: i64,
    pub rid: String,
    pub name: String,
    /// Discount in percent.
    pub sale: i32,
    pub size: String,
    pub total_price: i64,
    pub nm_id: i64,
    pub brand: String,
    pub status: i32,
}

impl Order {
    /// Bring the order into the exact shape the durable store returns it in.
    ///
    /// Items are sorted by `chrt_id` and `date_created` is truncated to
    /// microseconds, so a cached copy and a reloaded copy compare equal.
    pub fn normalize(&mut self) {
        self.items.sort_by_key(|item| item.chrt_id);
        self.date_created = self.date_created.trunc_subsecs(6);
    }

    /// Check the invariants serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::DuplicateItem`] if two items share a `chrt_id`.
    pub fn validate(&self) -> Result<(), OrderError> {
        let mut seen = HashSet::with_capacity(self.items.len());
        for item in &self.items {
            if !seen.insert(item.chrt_id) {
                return Err(OrderError::DuplicateItem {
                    chrt_id: item.chrt_id,
                });
            }
        }
        Ok(())
    }

    /// The `chrt_id`s of every item, in item order.
    #[must_use]
    pub fn chrt_ids(&self) -> Vec<i64> {
        self.items.iter().map(|item| item.chrt_id).collect()
    }
}
