//! Message bus boundary.
//!
//! The ingestion loop only needs three things from the bus: a subscription
//! yielding opaque payloads (at-least-once, unordered), a per-message
//! acknowledgement that can be withheld to get the message redelivered, and
//! a way to release the subscription and connection on shutdown.
//!
//! - [`nats`] - NATS `JetStream` implementation (durable pull consumer)
//! - `memory` - In-process implementation for tests (feature `testing`)

#[cfg(any(test, feature = "testing"))]
pub mod memory;
pub mod nats;

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

#[cfg(any(test, feature = "testing"))]
pub use memory::{MemoryBus, MemorySubscription};
pub use nats::{NatsBus, NatsPublisher, NatsSubscription};

/// Errors raised at the bus boundary.
#[derive(Debug, Error)]
pub enum BusError {
    /// Could not connect or set up the stream/consumer.
    #[error("connect failed: {0}")]
    Connect(String),

    /// Could not start the subscription.
    #[error("subscribe failed: {0}")]
    Subscribe(String),

    /// The subscription reported an error instead of a message.
    #[error("receive failed: {0}")]
    Receive(String),

    /// Acknowledging a message failed; the bus will redeliver it.
    #[error("ack failed: {0}")]
    Ack(String),

    /// Publishing a message failed.
    #[error("publish failed: {0}")]
    Publish(String),

    /// Releasing the connection failed.
    #[error("close failed: {0}")]
    Close(String),
}

/// Acknowledges one received message.
#[async_trait]
pub trait Acknowledge: Send + Sync {
    /// Tell the bus the message has been handled.
    async fn ack(&self) -> Result<(), BusError>;
}

/// A received message: payload plus the handle that acknowledges it.
///
/// Dropping a `Delivery` without calling [`Delivery::ack`] withholds the
/// acknowledgement, so the bus redelivers the message.
pub struct Delivery {
    payload: Vec<u8>,
    acker: Box<dyn Acknowledge>,
}

impl Delivery {
    /// Pair a payload with its acknowledgement handle.
    pub fn new(payload: Vec<u8>, acker: impl Acknowledge + 'static) -> Self {
        Self {
            payload,
            acker: Box::new(acker),
        }
    }

    /// The raw message body.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Acknowledge the message, consuming the delivery.
    ///
    /// # Errors
    ///
    /// Returns `BusError::Ack` if the bus rejects the acknowledgement.
    pub async fn ack(self) -> Result<(), BusError> {
        self.acker.ack().await
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("payload_len", &self.payload.len())
            .finish_non_exhaustive()
    }
}

/// An open subscription on the orders subject.
#[async_trait]
pub trait Subscription: Send {
    /// Wait for the next message. `None` means the subscription has ended.
    ///
    /// Must be cancel-safe: dropping the future loses no message.
    async fn next_delivery(&mut self) -> Option<Result<Delivery, BusError>>;

    /// Stop receiving. Unacknowledged messages stay with the bus.
    ///
    /// # Errors
    ///
    /// Returns `BusError::Close` if the bus could not be told.
    async fn unsubscribe(&mut self) -> Result<(), BusError>;
}

/// A connected bus.
#[async_trait]
pub trait Bus: Send + Sync {
    type Subscription: Subscription + 'static;

    /// Subscribe to the configured orders subject.
    ///
    /// # Errors
    ///
    /// Returns `BusError::Subscribe` if the subscription cannot be opened.
    async fn subscribe(&self) -> Result<Self::Subscription, BusError>;

    /// Flush and release the connection.
    ///
    /// # Errors
    ///
    /// Returns `BusError::Close` if pending data could not be flushed.
    async fn close(&self) -> Result<(), BusError>;
}
