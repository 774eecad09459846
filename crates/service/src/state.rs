//! Application state shared across handlers.

use std::sync::Arc;

use crate::query::OrderQuery;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    orders: OrderQuery,
}

impl AppState {
    /// Create a new application state around the read boundary.
    #[must_use]
    pub fn new(orders: OrderQuery) -> Self {
        Self {
            inner: Arc::new(AppStateInner { orders }),
        }
    }

    /// Get a reference to the order read boundary.
    #[must_use]
    pub fn orders(&self) -> &OrderQuery {
        &self.inner.orders
    }
}
