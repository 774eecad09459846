//! Order Cache Core - Shared order types.
//!
//! This crate provides the order aggregate used across the order cache
//! components:
//! - `service` - Ingestion loop, durable store, cache, and HTTP read surface
//! - `cli` - Command-line tools for checking and publishing order payloads
//!
//! # Architecture
//!
//! The core crate contains only types, decoding, and validation - no I/O, no
//! database access, no bus clients. With the `postgres` feature enabled the
//! identifier and item types gain `sqlx` encode/decode support.
//!
//! # Modules
//!
//! - [`types`] - The [`Order`] aggregate and its [`OrderUid`] identifier
//! - [`decode`] - Turning raw bus payloads into validated orders

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod decode;
pub mod types;

pub use decode::{DecodeError, decode_order};
pub use types::*;
