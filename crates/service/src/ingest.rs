//! Ingestion loop.
//!
//! Each message goes decode, validate, persist, cache, acknowledge. The order
//! matters: the cache only ever holds orders the store has accepted, and a
//! message is only acknowledged once it no longer needs to be redelivered.

use std::sync::Arc;

use order_cache_core::{DecodeError, OrderUid, decode_order};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::bus::Subscription;
use crate::cache::OrderCache;
use crate::store::{OrderStore, StoreError};

/// Terminal state of one message.
#[derive(Debug)]
pub enum Outcome {
    /// Persisted and cached.
    Ingested { order_uid: OrderUid },

    /// Undecodable or invalid. Dropped for good.
    Malformed { error: DecodeError },

    /// The store rejected the write. Nothing was cached.
    PersistFailed {
        order_uid: OrderUid,
        error: StoreError,
    },
}

impl Outcome {
    /// Whether the message should be acknowledged.
    ///
    /// Malformed payloads are acknowledged since redelivery cannot fix them;
    /// failed writes are not, so the bus delivers them again.
    #[must_use]
    pub const fn should_ack(&self) -> bool {
        !matches!(self, Self::PersistFailed { .. })
    }

    fn log(&self) {
        match self {
            Self::Ingested { order_uid } => {
                info!(order_uid = %order_uid, "Order ingested");
            }
            Self::Malformed { error } => {
                warn!(
                    order_uid = error.order_uid().unwrap_or("<unknown>"),
                    error = %error,
                    "Dropping malformed order payload"
                );
            }
            Self::PersistFailed { order_uid, error } => {
                error!(
                    order_uid = %order_uid,
                    error = %error,
                    "Failed to persist order, leaving it unacknowledged"
                );
            }
        }
    }
}

/// Counters reported when the loop stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    pub ingested: u64,
    pub malformed: u64,
    pub persist_failed: u64,
    pub ack_failed: u64,
}

impl RunStats {
    const fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Ingested { .. } => self.ingested += 1,
            Outcome::Malformed { .. } => self.malformed += 1,
            Outcome::PersistFailed { .. } => self.persist_failed += 1,
        }
    }
}

/// Drives bus messages into the store and the cache.
#[derive(Clone)]
pub struct Ingestor {
    store: Arc<dyn OrderStore>,
    cache: OrderCache,
}

impl Ingestor {
    /// Create an ingestor writing to `store` and publishing to `cache`.
    #[must_use]
    pub fn new(store: Arc<dyn OrderStore>, cache: OrderCache) -> Self {
        Self { store, cache }
    }

    /// Run one payload through the pipeline.
    pub async fn process(&self, payload: &[u8]) -> Outcome {
        let order = match decode_order(payload) {
            Ok(order) => order,
            Err(error) => return Outcome::Malformed { error },
        };

        if let Err(error) = self.store.upsert(&order).await {
            return Outcome::PersistFailed {
                order_uid: order.order_uid,
                error,
            };
        }

        let order_uid = order.order_uid.clone();
        self.cache.put(order);
        Outcome::Ingested { order_uid }
    }

    /// Consume `subscription` until it ends or `shutdown` is cancelled.
    ///
    /// Messages are handled one at a time. Cancellation is only observed
    /// between messages, so a message being processed always completes.
    pub async fn run<S>(&self, mut subscription: S, shutdown: CancellationToken) -> RunStats
    where
        S: Subscription,
    {
        let mut stats = RunStats::default();
        info!("Ingestion started");

        loop {
            let next = tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    info!("Shutdown requested, stopping ingestion");
                    break;
                }
                next = subscription.next_delivery() => next,
            };

            let delivery = match next {
                Some(Ok(delivery)) => delivery,
                Some(Err(e)) => {
                    warn!(error = %e, "Failed to receive message");
                    continue;
                }
                None => {
                    warn!("Subscription ended");
                    break;
                }
            };

            let outcome = self.process(delivery.payload()).await;
            outcome.log();
            stats.record(&outcome);

            if outcome.should_ack() {
                if let Err(e) = delivery.ack().await {
                    stats.ack_failed += 1;
                    warn!(error = %e, "Failed to acknowledge message, it will be redelivered");
                }
            }
        }

        if let Err(e) = subscription.unsubscribe().await {
            warn!(error = %e, "Failed to release subscription");
        }

        info!(
            ingested = stats.ingested,
            malformed = stats.malformed,
            persist_failed = stats.persist_failed,
            "Ingestion stopped"
        );
        stats
    }
}
