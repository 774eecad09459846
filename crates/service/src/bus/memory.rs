//! In-process bus for tests.
//!
//! Mirrors the at-least-once contract of the real bus: a delivered message
//! stays pending until it is acknowledged, and [`MemoryBus::redeliver_unacked`]
//! puts every pending message back on the subscription.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{Acknowledge, Bus, BusError, Delivery, Subscription};

#[derive(Default)]
struct State {
    next_id: u64,
    payloads: HashMap<u64, Vec<u8>>,
    delivered: BTreeSet<u64>,
    acked: BTreeSet<u64>,
    unsubscribed: bool,
    closed: bool,
}

type SharedState = Arc<Mutex<State>>;

fn lock(state: &SharedState) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Message bus held entirely in memory.
pub struct MemoryBus {
    state: SharedState,
    sender: Mutex<Option<mpsc::UnboundedSender<u64>>>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<u64>>>,
}

impl Default for MemoryBus {
    fn default() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            state: SharedState::default(),
            sender: Mutex::new(Some(sender)),
            receiver: Mutex::new(Some(receiver)),
        }
    }
}

impl MemoryBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a message. Returns its id.
    ///
    /// # Errors
    ///
    /// Returns `BusError::Publish` once the bus has been closed.
    pub fn publish(&self, payload: impl Into<Vec<u8>>) -> Result<u64, BusError> {
        let id = {
            let mut state = lock(&self.state);
            let id = state.next_id;
            state.next_id += 1;
            state.payloads.insert(id, payload.into());
            id
        };
        self.send(id)?;
        Ok(id)
    }

    /// Put every delivered but unacknowledged message back on the subscription.
    ///
    /// Returns how many messages were requeued.
    ///
    /// # Errors
    ///
    /// Returns `BusError::Publish` once the bus has been closed.
    pub fn redeliver_unacked(&self) -> Result<usize, BusError> {
        let pending: Vec<u64> = {
            let mut state = lock(&self.state);
            let pending: Vec<u64> = state.delivered.difference(&state.acked).copied().collect();
            for id in &pending {
                state.delivered.remove(id);
            }
            pending
        };
        for id in &pending {
            self.send(*id)?;
        }
        Ok(pending.len())
    }

    /// Whether the message with `id` has been acknowledged.
    #[must_use]
    pub fn is_acked(&self, id: u64) -> bool {
        lock(&self.state).acked.contains(&id)
    }

    /// Number of acknowledged messages.
    #[must_use]
    pub fn acked_count(&self) -> usize {
        lock(&self.state).acked.len()
    }

    /// Number of delivered messages still waiting for an acknowledgement.
    #[must_use]
    pub fn unacked_count(&self) -> usize {
        let state = lock(&self.state);
        state.delivered.difference(&state.acked).count()
    }

    /// Whether the subscriber has unsubscribed.
    #[must_use]
    pub fn is_unsubscribed(&self) -> bool {
        lock(&self.state).unsubscribed
    }

    /// Whether `close` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    fn send(&self, id: u64) -> Result<(), BusError> {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        sender
            .as_ref()
            .ok_or_else(|| BusError::Publish("bus is closed".to_string()))?
            .send(id)
            .map_err(|_| BusError::Publish("subscriber is gone".to_string()))
    }
}

#[async_trait]
impl Bus for MemoryBus {
    type Subscription = MemorySubscription;

    async fn subscribe(&self) -> Result<MemorySubscription, BusError> {
        let receiver = self
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| BusError::Subscribe("already subscribed".to_string()))?;
        Ok(MemorySubscription {
            receiver,
            state: Arc::clone(&self.state),
        })
    }

    /// Stop accepting messages. The subscription ends once it has drained
    /// what was already queued.
    async fn close(&self) -> Result<(), BusError> {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        lock(&self.state).closed = true;
        Ok(())
    }
}

/// The single subscription of a [`MemoryBus`].
pub struct MemorySubscription {
    receiver: mpsc::UnboundedReceiver<u64>,
    state: SharedState,
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn next_delivery(&mut self) -> Option<Result<Delivery, BusError>> {
        loop {
            let id = self.receiver.recv().await?;
            let payload = {
                let mut state = lock(&self.state);
                // A redelivery of something acked in the meantime is dropped.
                if state.acked.contains(&id) {
                    continue;
                }
                state.delivered.insert(id);
                state.payloads.get(&id).cloned()
            };
            if let Some(payload) = payload {
                let acker = MemoryAck {
                    id,
                    state: Arc::clone(&self.state),
                };
                return Some(Ok(Delivery::new(payload, acker)));
            }
        }
    }

    async fn unsubscribe(&mut self) -> Result<(), BusError> {
        self.receiver.close();
        lock(&self.state).unsubscribed = true;
        Ok(())
    }
}

struct MemoryAck {
    id: u64,
    state: SharedState,
}

#[async_trait]
impl Acknowledge for MemoryAck {
    async fn ack(&self) -> Result<(), BusError> {
        lock(&self.state).acked.insert(self.id);
        Ok(())
    }
}
