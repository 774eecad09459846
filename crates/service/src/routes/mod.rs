//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                 - Liveness check
//! GET  /health/ready           - Readiness check (store reachable)
//!
//! # Orders (JSON, served from the cache)
//! GET  /orders                 - All cached orders
//! GET  /orders/{order_uid}     - One order, 404 if unknown
//! ```

pub mod orders;

use axum::{Router, extract::State, http::StatusCode, routing::get};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", get(orders::index))
        .route("/orders/{order_uid}", get(orders::show))
}

/// Build the full application router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .merge(order_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the store is not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.orders().ping_store().await {
        Ok(()) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{Body, to_bytes},
        http::Request,
        response::Response,
    };
    use tower::ServiceExt;

    use super::*;
    use crate::cache::OrderCache;
    use crate::query::OrderQuery;
    use crate::testing::{MemoryOrderStore, sample_order};

    fn router(store: &Arc<MemoryOrderStore>, cache: &OrderCache) -> Router {
        app(AppState::new(OrderQuery::new(cache.clone(), store.clone())))
    }

    async fn send_get(router: Router, uri: &str) -> Response {
        router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let store = Arc::new(MemoryOrderStore::new());
        let response = send_get(router(&store, &OrderCache::new()), "/health").await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_readiness_follows_store() {
        let store = Arc::new(MemoryOrderStore::new());
        let cache = OrderCache::new();
        let response = send_get(router(&store, &cache), "/health/ready").await;
        assert_eq!(response.status(), StatusCode::OK);

        store.fail_reads(true);
        let response = send_get(router(&store, &cache), "/health/ready").await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_show_cached_order() {
        let store = Arc::new(MemoryOrderStore::new());
        let cache = OrderCache::new();
        cache.put(sample_order("abc123", &[1, 2]));

        let response = send_get(router(&store, &cache), "/orders/abc123").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["order_uid"], "abc123");
        assert_eq!(body["items"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_show_unknown_order_is_404() {
        let store = Arc::new(MemoryOrderStore::new());
        let response = send_get(router(&store, &OrderCache::new()), "/orders/missing").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_show_store_failure_is_500() {
        let store = Arc::new(MemoryOrderStore::new());
        store.fail_reads(true);
        let response = send_get(router(&store, &OrderCache::new()), "/orders/missing").await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_index_lists_sorted() {
        let store = Arc::new(MemoryOrderStore::new());
        let cache = OrderCache::new();
        cache.put(sample_order("b", &[1]));
        cache.put(sample_order("a", &[1]));

        let response = send_get(router(&store, &cache), "/orders").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        let ids: Vec<_> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|o| o["order_uid"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
