//! In-memory integration-event bus.
//!
//! Publishes are stored per topic and fanned out to live subscribers in
//! order. The bus deliberately exposes [`InMemoryEventBus::redeliver`] so
//! tests can exercise the at-least-once contract: a consumer that cannot
//! survive seeing the same message twice fails here before it fails in
//! production. Acknowledgments are recorded per topic so tests can also
//! check that a consumer only acknowledges after processing.

use async_stream::stream;
use roomline_core::event_bus::{Delivery, EventBus, EventBusError, IntegrationStream};
use roomline_core::integration::IntegrationEvent;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{RwLock, mpsc};

type Sent = Result<Delivery, EventBusError>;

#[derive(Default)]
struct Topic {
    messages: Vec<(String, IntegrationEvent)>,
    subscribers: Vec<mpsc::UnboundedSender<Sent>>,
}

/// In-memory [`EventBus`] for tests.
///
/// Consumer groups are not modelled: every subscriber of a topic sees every
/// message. New subscribers first receive the topic's backlog, matching a
/// fresh group reading from the earliest offset.
#[derive(Clone, Default)]
pub struct InMemoryEventBus {
    topics: Arc<RwLock<HashMap<String, Topic>>>,
    acked: Arc<Mutex<HashMap<String, Vec<String>>>>,
}

impl InMemoryEventBus {
    /// Create a bus with no topics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything published to `topic` so far, in publish order.
    pub async fn published(&self, topic: &str) -> Vec<IntegrationEvent> {
        self.topics
            .read()
            .await
            .get(topic)
            .map(|t| t.messages.iter().map(|(_, event)| event.clone()).collect())
            .unwrap_or_default()
    }

    /// Causation ids of deliveries acknowledged on `topic`, in ack order.
    #[must_use]
    pub fn acknowledged(&self, topic: &str) -> Vec<String> {
        self.acked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }

    /// Resend the whole backlog of `topic` to current subscribers.
    ///
    /// Simulates a broker redelivering messages after a consumer restart or
    /// rebalance. At-least-once permits redelivery of acknowledged messages
    /// too, so the full backlog goes out.
    pub async fn redeliver(&self, topic: &str) {
        let mut topics = self.topics.write().await;
        if let Some(t) = topics.get_mut(topic) {
            for (_, event) in t.messages.clone() {
                t.subscribers
                    .retain(|tx| tx.send(Ok(self.delivery(topic, &event))).is_ok());
            }
        }
    }

    fn delivery(&self, topic: &str, event: &IntegrationEvent) -> Delivery {
        let acked = Arc::clone(&self.acked);
        let topic = topic.to_string();
        let causation_id = event.causation_id.clone();
        Delivery::with_ack(
            event.clone(),
            Box::new(move || {
                acked
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .entry(topic)
                    .or_default()
                    .push(causation_id);
            }),
        )
    }
}

impl EventBus for InMemoryEventBus {
    fn publish<'a>(
        &'a self,
        topic: &'a str,
        key: &'a str,
        event: &'a IntegrationEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + 'a>> {
        Box::pin(async move {
            let mut topics = self.topics.write().await;
            let t = topics.entry(topic.to_string()).or_default();
            t.messages.push((key.to_string(), event.clone()));
            t.subscribers
                .retain(|tx| tx.send(Ok(self.delivery(topic, event))).is_ok());
            Ok(())
        })
    }

    fn subscribe<'a>(
        &'a self,
        topic: &'a str,
        _group: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<IntegrationStream, EventBusError>> + Send + 'a>> {
        Box::pin(async move {
            let (tx, mut rx) = mpsc::unbounded_channel();
            {
                let mut topics = self.topics.write().await;
                let t = topics.entry(topic.to_string()).or_default();
                for (_, event) in t.messages.clone() {
                    // Unbounded sends to a receiver we still hold cannot fail.
                    let _ = tx.send(Ok(self.delivery(topic, &event)));
                }
                t.subscribers.push(tx);
            }
            let stream = stream! {
                while let Some(sent) = rx.recv().await {
                    yield sent;
                }
            };
            Ok(Box::pin(stream) as IntegrationStream)
        })
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn event(event_type: &str, causation: &str) -> IntegrationEvent {
        IntegrationEvent {
            event_type: event_type.to_string(),
            schema_version: 1,
            payload: serde_json::json!({}),
            correlation_id: "corr".to_string(),
            causation_id: causation.to_string(),
            occurred_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn subscribers_get_backlog_then_live_messages() {
        let bus = InMemoryEventBus::new();
        bus.publish("payments", "P1", &event("PaymentConfirmed.v1", "Payment-P1:0"))
            .await
            .expect("publish");

        let mut stream = bus.subscribe("payments", "bookings").await.expect("subscribe");
        bus.publish("payments", "P2", &event("PaymentConfirmed.v1", "Payment-P2:0"))
            .await
            .expect("publish");

        let first = stream.next().await.expect("backlog").expect("ok");
        let second = stream.next().await.expect("live").expect("ok");
        assert_eq!(first.event.causation_id, "Payment-P1:0");
        assert_eq!(second.event.causation_id, "Payment-P2:0");
    }

    #[tokio::test]
    async fn redeliver_resends_the_backlog() {
        let bus = InMemoryEventBus::new();
        let mut stream = bus.subscribe("payments", "bookings").await.expect("subscribe");
        bus.publish("payments", "P1", &event("PaymentConfirmed.v1", "Payment-P1:0"))
            .await
            .expect("publish");
        bus.redeliver("payments").await;

        let first = stream.next().await.expect("delivery").expect("ok");
        let again = stream.next().await.expect("redelivery").expect("ok");
        assert_eq!(first.event.causation_id, again.event.causation_id);
    }

    #[tokio::test]
    async fn acknowledgments_are_recorded_per_topic() {
        let bus = InMemoryEventBus::new();
        let mut stream = bus.subscribe("payments", "bookings").await.expect("subscribe");
        bus.publish("payments", "P1", &event("PaymentConfirmed.v1", "Payment-P1:0"))
            .await
            .expect("publish");

        let delivery = stream.next().await.expect("delivery").expect("ok");
        assert!(bus.acknowledged("payments").is_empty());

        delivery.ack();
        assert_eq!(bus.acknowledged("payments"), vec!["Payment-P1:0".to_string()]);
    }
}
