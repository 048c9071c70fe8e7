//! Broker abstraction for integration events.
//!
//! The bus carries [`IntegrationEvent`]s between bounded contexts with
//! at-least-once delivery. Publishing takes a partition key (producers pass
//! the originating stream id) so messages about one aggregate stay ordered
//! even though the topic as a whole is partitioned.
//!
//! Consuming is pull-plus-acknowledge: each [`Delivery`] carries the decoded
//! event and an acknowledgment that the consumer fires only after the event's
//! effect has been durably applied. A crash before the acknowledgment leaves
//! the message unacknowledged at the broker, so it is redelivered rather than
//! lost.
//!
//! # Implementations
//!
//! - `RedpandaEventBus` (`roomline-redpanda`): Kafka-compatible production bus.
//! - `InMemoryEventBus` (`roomline-testing`): deterministic tests, with
//!   explicit redelivery to simulate at-least-once.

use crate::integration::IntegrationEvent;
use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors from broker operations.
#[derive(Error, Debug, Clone)]
pub enum EventBusError {
    /// Could not connect to the broker.
    #[error("broker connection failed: {0}")]
    ConnectionFailed(String),

    /// A publish did not get acknowledged. The caller must not checkpoint
    /// past the originating event; the publish is retried on redelivery.
    #[error("publish to '{topic}' failed: {reason}")]
    PublishFailed {
        /// Topic that failed.
        topic: String,
        /// Broker-reported reason.
        reason: String,
    },

    /// Could not establish a subscription.
    #[error("subscription to '{topic}' failed: {reason}")]
    SubscriptionFailed {
        /// Topic that failed.
        topic: String,
        /// Broker-reported reason.
        reason: String,
    },

    /// A received message did not decode as an integration event.
    #[error("integration event failed to decode: {0}")]
    Deserialization(String),

    /// Transport-level failure while consuming.
    #[error("broker transport error: {0}")]
    Transport(String),
}

/// Acknowledgment hook attached to a [`Delivery`].
pub type AckFn = Box<dyn FnOnce() + Send>;

/// One message pulled from a subscription.
///
/// The consumer calls [`Delivery::ack`] once the event's effect has durably
/// committed (or the event is known to be unprocessable and is being
/// skipped). Dropping a delivery without acknowledging it leaves the message
/// unacknowledged at the broker; it comes back after a restart.
pub struct Delivery {
    /// The decoded integration event.
    pub event: IntegrationEvent,
    ack: Option<AckFn>,
}

impl Delivery {
    /// A delivery whose acknowledgment is a no-op.
    #[must_use]
    pub fn unacknowledged(event: IntegrationEvent) -> Self {
        Self { event, ack: None }
    }

    /// A delivery that runs `ack` when acknowledged.
    #[must_use]
    pub fn with_ack(event: IntegrationEvent, ack: AckFn) -> Self {
        Self {
            event,
            ack: Some(ack),
        }
    }

    /// Acknowledge the message to the broker.
    pub fn ack(self) {
        if let Some(ack) = self.ack {
            ack();
        }
    }
}

/// Stream of acknowledgeable deliveries from a subscription.
pub type IntegrationStream = Pin<Box<dyn Stream<Item = Result<Delivery, EventBusError>> + Send>>;

/// Publish/subscribe transport for integration events.
///
/// Delivery is at-least-once: consumers must deduplicate on
/// [`IntegrationEvent::causation_id`] or be naturally idempotent.
pub trait EventBus: Send + Sync {
    /// Publish one integration event to `topic`, partitioned by `key`.
    ///
    /// Events published with the same key are delivered to consumers in
    /// publish order.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::PublishFailed`] when the broker does not
    /// acknowledge the write.
    fn publish<'a>(
        &'a self,
        topic: &'a str,
        key: &'a str,
        event: &'a IntegrationEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + 'a>>;

    /// Subscribe to `topic` as a member of `group`.
    ///
    /// Each item is acknowledged individually via [`Delivery::ack`];
    /// redelivery of messages the group has not acknowledged is expected
    /// after restarts.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::SubscriptionFailed`] when the subscription
    /// cannot be established.
    fn subscribe<'a>(
        &'a self,
        topic: &'a str,
        group: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<IntegrationStream, EventBusError>> + Send + 'a>>;
}
