//! # roomline-redpanda
//!
//! Redpanda (Kafka-compatible) implementation of the `roomline-core`
//! [`EventBus`] contract, carrying integration events between the Bookings
//! and Payments contexts.
//!
//! # Delivery semantics
//!
//! At-least-once, with manual offset commits:
//! - publishes are keyed by the originating stream id, so one aggregate's
//!   messages land on one partition and stay ordered;
//! - each delivery carries an acknowledgment that commits its offset; the
//!   subscriber fires it only after processing, so a crash with the message
//!   still in flight causes redelivery, never loss;
//! - consumers must deduplicate on the integration event's `causation_id`
//!   or apply naturally idempotent commands.
//!
//! Messages are JSON on the wire: the payload schema is the cross-context
//! contract and must stay readable without this crate's internal types.
//!
//! # Example
//!
//! ```no_run
//! use roomline_redpanda::RedpandaEventBus;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let bus = RedpandaEventBus::builder()
//!     .brokers("localhost:9092")
//!     .producer_acks("all")
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use rdkafka::{Offset, TopicPartitionList};
use roomline_core::event_bus::{AckFn, Delivery, EventBus, EventBusError, IntegrationStream};
use roomline_core::integration::IntegrationEvent;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Redpanda-backed [`EventBus`].
pub struct RedpandaEventBus {
    producer: FutureProducer,
    brokers: String,
    timeout: Duration,
    buffer_size: usize,
    auto_offset_reset: String,
}

impl RedpandaEventBus {
    /// Create a bus with default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] when the producer cannot
    /// be created.
    pub fn new(brokers: &str) -> Result<Self, EventBusError> {
        Self::builder().brokers(brokers).build()
    }

    /// Create a builder for custom configuration.
    #[must_use]
    pub fn builder() -> RedpandaEventBusBuilder {
        RedpandaEventBusBuilder::default()
    }

    /// Broker addresses this bus talks to.
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }
}

/// Builder for a [`RedpandaEventBus`].
#[derive(Default)]
pub struct RedpandaEventBusBuilder {
    brokers: Option<String>,
    producer_acks: Option<String>,
    compression: Option<String>,
    timeout: Option<Duration>,
    buffer_size: Option<usize>,
    auto_offset_reset: Option<String>,
}

impl RedpandaEventBusBuilder {
    /// Comma-separated broker addresses, e.g. `"localhost:9092"`.
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Producer acknowledgment mode: `"0"`, `"1"` or `"all"`. Defaults to
    /// `"all"`, since an unacknowledged integration event is a lost
    /// cross-context effect.
    #[must_use]
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        self.producer_acks = Some(acks.into());
        self
    }

    /// Compression codec: `"none"`, `"gzip"`, `"snappy"`, `"lz4"`, `"zstd"`.
    #[must_use]
    pub fn compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    /// Producer send timeout. Default 5 seconds.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// In-memory buffer between the Kafka consumer and the subscriber
    /// (minimum 1, default 1000).
    #[must_use]
    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = Some(buffer_size.max(1));
        self
    }

    /// Where a new consumer group starts reading: `"earliest"` or
    /// `"latest"`. Default `"earliest"` so a freshly deployed consumer
    /// processes the integration backlog instead of skipping it.
    #[must_use]
    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = Some(policy.into());
        self
    }

    /// Build the bus.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] when brokers are missing
    /// or the producer cannot be created.
    pub fn build(self) -> Result<RedpandaEventBus, EventBusError> {
        let brokers = self
            .brokers
            .ok_or_else(|| EventBusError::ConnectionFailed("brokers not configured".to_string()))?;

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", "5000")
            .set("acks", self.producer_acks.as_deref().unwrap_or("all"))
            .set("compression.type", self.compression.as_deref().unwrap_or("none"))
            .create()
            .map_err(|e| {
                EventBusError::ConnectionFailed(format!("failed to create producer: {e}"))
            })?;

        tracing::info!(
            brokers = %brokers,
            acks = self.producer_acks.as_deref().unwrap_or("all"),
            "redpanda event bus created"
        );

        Ok(RedpandaEventBus {
            producer,
            brokers,
            timeout: self.timeout.unwrap_or(Duration::from_secs(5)),
            buffer_size: self.buffer_size.unwrap_or(1000),
            auto_offset_reset: self
                .auto_offset_reset
                .unwrap_or_else(|| "earliest".to_string()),
        })
    }
}

/// Build an acknowledgment that commits the message's offset.
fn commit_on_ack(
    consumer: Arc<StreamConsumer>,
    topic: String,
    partition: i32,
    offset: i64,
) -> AckFn {
    Box::new(move || {
        let mut offsets = TopicPartitionList::new();
        // The committed offset names the next message to read, not this one.
        let staged = offsets.add_partition_offset(&topic, partition, Offset::Offset(offset + 1));
        let result = staged.and_then(|()| consumer.commit(&offsets, CommitMode::Async));
        if let Err(e) = result {
            tracing::warn!(
                topic = %topic,
                partition,
                offset,
                error = %e,
                "offset commit failed, message may be redelivered"
            );
        }
    })
}

impl EventBus for RedpandaEventBus {
    fn publish<'a>(
        &'a self,
        topic: &'a str,
        key: &'a str,
        event: &'a IntegrationEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + 'a>> {
        Box::pin(async move {
            let payload =
                serde_json::to_vec(event).map_err(|e| EventBusError::PublishFailed {
                    topic: topic.to_string(),
                    reason: format!("failed to serialize integration event: {e}"),
                })?;

            let record = FutureRecord::to(topic).payload(&payload).key(key.as_bytes());
            match self.producer.send(record, Timeout::After(self.timeout)).await {
                Ok((partition, offset)) => {
                    tracing::debug!(
                        topic,
                        partition,
                        offset,
                        key,
                        event_type = %event.event_type,
                        "integration event published"
                    );
                    Ok(())
                }
                Err((kafka_error, _)) => {
                    tracing::error!(topic, key, error = %kafka_error, "publish failed");
                    Err(EventBusError::PublishFailed {
                        topic: topic.to_string(),
                        reason: kafka_error.to_string(),
                    })
                }
            }
        })
    }

    fn subscribe<'a>(
        &'a self,
        topic: &'a str,
        group: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<IntegrationStream, EventBusError>> + Send + 'a>> {
        let brokers = self.brokers.clone();
        let buffer_size = self.buffer_size;
        let auto_offset_reset = self.auto_offset_reset.clone();

        Box::pin(async move {
            let subscription_failed = |reason: String| EventBusError::SubscriptionFailed {
                topic: topic.to_string(),
                reason,
            };

            // Manual commits give at-least-once delivery.
            let consumer: StreamConsumer = ClientConfig::new()
                .set("bootstrap.servers", &brokers)
                .set("group.id", group)
                .set("enable.auto.commit", "false")
                .set("auto.offset.reset", &auto_offset_reset)
                .set("session.timeout.ms", "6000")
                .set("enable.partition.eof", "false")
                .create()
                .map_err(|e| subscription_failed(format!("failed to create consumer: {e}")))?;
            consumer
                .subscribe(&[topic])
                .map_err(|e| subscription_failed(format!("failed to subscribe: {e}")))?;

            tracing::info!(
                topic,
                group,
                auto_offset_reset = %auto_offset_reset,
                "subscribed to integration topic"
            );

            let (tx, mut rx) = tokio::sync::mpsc::channel(buffer_size);
            let consumer = Arc::new(consumer);
            tokio::spawn(async move {
                use futures::StreamExt;

                let mut stream = consumer.stream();
                while let Some(delivery) = stream.next().await {
                    let message = match delivery {
                        Ok(message) => message,
                        Err(e) => {
                            let err = EventBusError::Transport(e.to_string());
                            if tx.send(Err(err)).await.is_err() {
                                break;
                            }
                            continue;
                        }
                    };

                    let decoded = message
                        .payload()
                        .ok_or_else(|| {
                            EventBusError::Deserialization("message has no payload".to_string())
                        })
                        .and_then(|payload| {
                            serde_json::from_slice::<IntegrationEvent>(payload)
                                .map_err(|e| EventBusError::Deserialization(e.to_string()))
                        });

                    let event = match decoded {
                        Ok(event) => event,
                        Err(err) => {
                            // An undecodable message can never be processed;
                            // commit it so restarts do not replay it forever.
                            if let Err(e) = consumer.commit_message(&message, CommitMode::Async) {
                                tracing::warn!(error = %e, "commit of undecodable message failed");
                            }
                            if tx.send(Err(err)).await.is_err() {
                                break;
                            }
                            continue;
                        }
                    };

                    // The offset is committed by the acknowledgment, which the
                    // subscriber fires only after processing the event. A
                    // crash with the message still buffered or in flight
                    // leaves the offset uncommitted and the message is
                    // redelivered.
                    let ack = commit_on_ack(
                        Arc::clone(&consumer),
                        message.topic().to_string(),
                        message.partition(),
                        message.offset(),
                    );
                    if tx.send(Ok(Delivery::with_ack(event, ack))).await.is_err() {
                        tracing::debug!("subscriber dropped, consumer task exiting");
                        break;
                    }
                }
            });

            let stream = async_stream::stream! {
                while let Some(delivery) = rx.recv().await {
                    yield delivery;
                }
            };
            Ok(Box::pin(stream) as IntegrationStream)
        })
    }
}
