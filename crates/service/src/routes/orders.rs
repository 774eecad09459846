//! Order lookup routes.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
};
use order_cache_core::Order;

use crate::error::{AppError, Result};
use crate::state::AppState;

/// List every cached order.
///
/// GET /orders
pub async fn index(State(state): State<AppState>) -> Json<Vec<Arc<Order>>> {
    Json(state.orders().list_all())
}

/// Show one order.
///
/// GET /orders/{order_uid}
///
/// # Errors
///
/// Returns `AppError::NotFound` for an unknown id and `AppError::Store` if
/// the store fails on a cache miss.
pub async fn show(
    State(state): State<AppState>,
    Path(order_uid): Path<String>,
) -> Result<Json<Arc<Order>>> {
    state
        .orders()
        .get_by_id(&order_uid)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("order {order_uid}")))
}
