//! Order cache service.
//!
//! Consumes order events from NATS `JetStream`, persists each order
//! aggregate to `PostgreSQL` in one transaction, and serves lookups from an
//! in-memory cache that is hydrated from the database at startup.
//!
//! # Architecture
//!
//! - [`ingest`] - Decode, persist, cache, acknowledge
//! - [`store`] - Transactional aggregate persistence (`PostgreSQL`)
//! - [`cache`] - Concurrent in-memory read cache
//! - [`query`] - Cache-first lookups with read-through on a miss
//! - [`hydrate`] - Startup cache load
//! - [`bus`] - Message bus boundary and the NATS implementation
//! - [`routes`] - Axum JSON routes over [`query`]

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod bus;
pub mod cache;
pub mod config;
pub mod error;
pub mod hydrate;
pub mod ingest;
pub mod query;
pub mod retry;
pub mod routes;
pub mod server;
pub mod state;
pub mod store;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use cache::OrderCache;
pub use config::{BusConfig, ConfigError, ServiceConfig};
pub use error::{AppError, StartupError};
pub use ingest::{Ingestor, Outcome, RunStats};
pub use query::OrderQuery;
pub use retry::RetryPolicy;
pub use store::{OrderStore, StoreError};
