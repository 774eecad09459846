//! Boot sequence and graceful shutdown.
//!
//! ```text
//! connect store -> hydrate cache -> connect bus (retried) -> subscribe
//!   -> spawn ingestion -> serve HTTP
//! shutdown: drain HTTP -> stop ingestion between messages -> unsubscribe
//!   -> close bus -> close store
//! ```

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::bus::{Bus, NatsBus};
use crate::cache::OrderCache;
use crate::config::ServiceConfig;
use crate::error::StartupError;
use crate::hydrate::hydrate;
use crate::ingest::Ingestor;
use crate::query::OrderQuery;
use crate::routes;
use crate::state::AppState;
use crate::store::{OrderStore, PgOrderStore};

/// Run the service until a shutdown signal arrives or ingestion stops.
///
/// Connections opened here are released on every exit path after the
/// point where they were opened.
///
/// # Errors
///
/// Returns `StartupError` if a dependency cannot be reached at boot, the
/// listener cannot bind, or the server fails while running.
pub async fn run(config: ServiceConfig) -> Result<(), StartupError> {
    let store: Arc<dyn OrderStore> = Arc::new(PgOrderStore::connect(&config.database_url).await?);
    info!("Database pool created");

    // NOTE: Migrations are NOT run automatically on startup.
    // Apply them explicitly via: sqlx migrate run --source crates/service/migrations

    let cache = OrderCache::new();
    if let Err(e) = hydrate(store.as_ref(), &cache).await {
        store.close().await;
        return Err(e.into());
    }

    let bus = match config
        .bus
        .retry_policy()
        .retry("connect to NATS", || NatsBus::connect(&config.bus))
        .await
    {
        Ok(bus) => bus,
        Err(e) => {
            store.close().await;
            return Err(e.into());
        }
    };

    let result = serve(&config, &bus, Arc::clone(&store), cache).await;

    if let Err(e) = bus.close().await {
        warn!(error = %e, "Failed to close message bus connection");
    }
    store.close().await;
    info!("Shutdown complete");

    result
}

async fn serve(
    config: &ServiceConfig,
    bus: &NatsBus,
    store: Arc<dyn OrderStore>,
    cache: OrderCache,
) -> Result<(), StartupError> {
    let subscription = bus.subscribe().await?;
    let shutdown = CancellationToken::new();

    let ingestor = Ingestor::new(Arc::clone(&store), cache.clone());
    let ingestion = tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            let stats = ingestor.run(subscription, shutdown.clone()).await;
            // Nothing more will be ingested, so stop serving as well.
            shutdown.cancel();
            stats
        }
    });

    let state = AppState::new(OrderQuery::new(cache, store));
    let app = routes::app(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction());

    let addr = config.socket_addr();
    let served = match TcpListener::bind(addr).await {
        Ok(listener) => {
            info!("order cache listening on {}", addr);
            let stop = shutdown.clone();
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    tokio::select! {
                        () = shutdown_signal() => {},
                        () = stop.cancelled() => {},
                    }
                })
                .await
                .map_err(StartupError::Serve)
        }
        Err(source) => Err(StartupError::Bind { addr, source }),
    };

    // Stop ingestion between messages and wait for the in-flight one.
    shutdown.cancel();
    let ingested = ingestion.await;

    served?;
    let stats = ingested?;
    info!(
        ingested = stats.ingested,
        malformed = stats.malformed,
        persist_failed = stats.persist_failed,
        "Ingestion summary"
    );
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}
