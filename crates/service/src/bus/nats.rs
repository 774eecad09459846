//! NATS `JetStream` bus.
//!
//! Orders are consumed through a durable pull consumer with explicit acks:
//! a message that is not acknowledged within the ack wait is redelivered,
//! including to the next process after a restart.

use async_nats::jetstream::{
    self,
    consumer::{AckPolicy, PullConsumer, pull},
    stream,
};
use async_trait::async_trait;
use futures::StreamExt;
use tracing::{debug, info, instrument};

use super::{Acknowledge, Bus, BusError, Delivery, Subscription};
use crate::config::BusConfig;

/// Connect to the server named in `config`, identifying as its client id.
async fn connect_client(config: &BusConfig) -> Result<async_nats::Client, BusError> {
    async_nats::ConnectOptions::new()
        .name(config.client_id.as_str())
        .connect(config.url.as_str())
        .await
        .map_err(|e| BusError::Connect(e.to_string()))
}

/// Get the orders stream, creating it over the configured subject if needed.
async fn ensure_stream(
    context: &jetstream::Context,
    config: &BusConfig,
) -> Result<stream::Stream, BusError> {
    context
        .get_or_create_stream(stream::Config {
            name: config.stream.clone(),
            subjects: vec![config.subject.clone()],
            ..Default::default()
        })
        .await
        .map_err(|e| BusError::Connect(e.to_string()))
}

/// Consuming side of the bus.
pub struct NatsBus {
    client: async_nats::Client,
    consumer: PullConsumer,
}

impl NatsBus {
    /// Connect and set up the stream and the durable consumer.
    ///
    /// # Errors
    ///
    /// Returns `BusError::Connect` if the server is unreachable or the stream
    /// or consumer cannot be created.
    #[instrument(skip(config), fields(url = %config.redacted_url(), consumer = %config.consumer))]
    pub async fn connect(config: &BusConfig) -> Result<Self, BusError> {
        let client = connect_client(config).await?;
        let context = jetstream::new(client.clone());
        let stream = ensure_stream(&context, config).await?;

        let consumer = stream
            .get_or_create_consumer(
                &config.consumer,
                pull::Config {
                    durable_name: Some(config.consumer.clone()),
                    filter_subject: config.subject.clone(),
                    ack_policy: AckPolicy::Explicit,
                    ack_wait: config.ack_wait,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| BusError::Connect(e.to_string()))?;

        info!("Connected to NATS");
        Ok(Self { client, consumer })
    }
}

#[async_trait]
impl Bus for NatsBus {
    type Subscription = NatsSubscription;

    async fn subscribe(&self) -> Result<NatsSubscription, BusError> {
        let messages = self
            .consumer
            .messages()
            .await
            .map_err(|e| BusError::Subscribe(e.to_string()))?;
        Ok(NatsSubscription {
            messages: Some(messages),
        })
    }

    async fn close(&self) -> Result<(), BusError> {
        self.client
            .flush()
            .await
            .map_err(|e| BusError::Close(e.to_string()))?;
        debug!("NATS connection flushed");
        Ok(())
    }
}

/// Message stream of the durable consumer.
pub struct NatsSubscription {
    messages: Option<pull::Stream>,
}

#[async_trait]
impl Subscription for NatsSubscription {
    async fn next_delivery(&mut self) -> Option<Result<Delivery, BusError>> {
        let messages = self.messages.as_mut()?;
        match messages.next().await? {
            Ok(message) => {
                let payload = message.message.payload.to_vec();
                Some(Ok(Delivery::new(payload, JetStreamAck(message))))
            }
            Err(e) => Some(Err(BusError::Receive(e.to_string()))),
        }
    }

    async fn unsubscribe(&mut self) -> Result<(), BusError> {
        // Dropping the pull stream stops fetching; pending messages stay on
        // the durable consumer.
        if self.messages.take().is_some() {
            debug!("NATS subscription released");
        }
        Ok(())
    }
}

struct JetStreamAck(jetstream::Message);

#[async_trait]
impl Acknowledge for JetStreamAck {
    async fn ack(&self) -> Result<(), BusError> {
        self.0.ack().await.map_err(|e| BusError::Ack(e.to_string()))
    }
}

/// Publishing side of the bus, used by operator tooling.
pub struct NatsPublisher {
    client: async_nats::Client,
    context: jetstream::Context,
    subject: String,
}

impl NatsPublisher {
    /// Connect and make sure the orders stream exists.
    ///
    /// # Errors
    ///
    /// Returns `BusError::Connect` if the server is unreachable or the stream
    /// cannot be created.
    pub async fn connect(config: &BusConfig) -> Result<Self, BusError> {
        let client = connect_client(config).await?;
        let context = jetstream::new(client.clone());
        ensure_stream(&context, config).await?;
        Ok(Self {
            client,
            context,
            subject: config.subject.clone(),
        })
    }

    /// Publish one payload and wait for the stream to store it.
    ///
    /// # Errors
    ///
    /// Returns `BusError::Publish` if the server rejects the message.
    pub async fn publish(&self, payload: Vec<u8>) -> Result<(), BusError> {
        self.context
            .publish(self.subject.clone(), payload.into())
            .await
            .map_err(|e| BusError::Publish(e.to_string()))?
            .await
            .map_err(|e| BusError::Publish(e.to_string()))?;
        Ok(())
    }

    /// Flush pending data.
    ///
    /// # Errors
    ///
    /// Returns `BusError::Close` if the flush fails.
    pub async fn close(&self) -> Result<(), BusError> {
        self.client
            .flush()
            .await
            .map_err(|e| BusError::Close(e.to_string()))
    }
}
