//! Core types for the order cache.
//!
//! This module provides the order aggregate and its type-safe identifier.

pub mod id;
pub mod order;

pub use id::{OrderUid, OrderUidError};
pub use order::{Delivery, Item, Order, OrderError, Payment};
