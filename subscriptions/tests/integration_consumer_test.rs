//! Consumer-loop tests against the in-memory bus.

#![allow(clippy::expect_used, clippy::panic)]

use roomline_core::event_bus::EventBus;
use roomline_core::handler::HandlerError;
use roomline_core::integration::IntegrationEvent;
use roomline_runtime::retry::RetryPolicy;
use roomline_subscriptions::{IntegrationConsumer, IntegrationHandler};
use roomline_testing::InMemoryEventBus;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::sleep;

#[derive(Clone, Default)]
struct CountingHandler {
    seen: Arc<Mutex<Vec<String>>>,
    transient_failures: Arc<AtomicU32>,
}

impl IntegrationHandler for CountingHandler {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn handle<'a>(
        &'a self,
        event: &'a IntegrationEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + 'a>> {
        Box::pin(async move {
            if self
                .transient_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(HandlerError::Transient("scripted outage".to_string()));
            }
            self.seen.lock().await.push(event.causation_id.clone());
            Ok(())
        })
    }
}

/// Blocks in `handle` until the test releases the gate.
struct GatedHandler {
    entered: Arc<AtomicU32>,
    gate: Arc<Semaphore>,
    seen: Arc<Mutex<Vec<String>>>,
}

impl IntegrationHandler for GatedHandler {
    fn name(&self) -> &'static str {
        "gated"
    }

    fn handle<'a>(
        &'a self,
        event: &'a IntegrationEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + 'a>> {
        Box::pin(async move {
            self.entered.fetch_add(1, Ordering::SeqCst);
            let permit = self
                .gate
                .acquire()
                .await
                .map_err(|e| HandlerError::Transient(e.to_string()))?;
            permit.forget();
            self.seen.lock().await.push(event.causation_id.clone());
            Ok(())
        })
    }
}

struct PoisonHandler;

impl IntegrationHandler for PoisonHandler {
    fn name(&self) -> &'static str {
        "poison"
    }

    fn handle<'a>(
        &'a self,
        _event: &'a IntegrationEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + 'a>> {
        Box::pin(async move { Err(HandlerError::Poison("unmappable payload".to_string())) })
    }
}

fn confirmed(causation: &str) -> IntegrationEvent {
    IntegrationEvent {
        event_type: "PaymentConfirmed.v1".to_string(),
        schema_version: 1,
        payload: serde_json::json!({ "paymentId": "P1" }),
        correlation_id: "corr".to_string(),
        causation_id: causation.to_string(),
        occurred_at: chrono::Utc::now(),
    }
}

async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..500 {
        if check().await {
            return;
        }
        sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for: {what}");
}

#[tokio::test]
async fn delivers_published_events_to_the_handler() {
    let bus = Arc::new(InMemoryEventBus::new());
    let handler = CountingHandler::default();
    let consumer = IntegrationConsumer::new(
        Arc::clone(&bus) as _,
        "payments-integration",
        "bookings",
        Arc::new(handler.clone()),
    )
    .start()
    .await
    .expect("start");

    bus.publish("payments-integration", "P1", &confirmed("Payment-P1:0"))
        .await
        .expect("publish");

    eventually("event handled", || async { handler.seen.lock().await.len() == 1 }).await;
    consumer.shutdown().await;
}

#[tokio::test]
async fn transient_failures_retry_until_the_command_lands() {
    let bus = Arc::new(InMemoryEventBus::new());
    let handler = CountingHandler::default();
    handler.transient_failures.store(3, Ordering::SeqCst);

    let consumer = IntegrationConsumer::new(
        Arc::clone(&bus) as _,
        "payments-integration",
        "bookings",
        Arc::new(handler.clone()),
    )
    .with_retry_policy(
        RetryPolicy::builder()
            .initial_delay(Duration::from_millis(5))
            .max_delay(Duration::from_millis(20))
            .build(),
    )
    .start()
    .await
    .expect("start");

    bus.publish("payments-integration", "P1", &confirmed("Payment-P1:0"))
        .await
        .expect("publish");

    eventually("event eventually handled", || async {
        handler.seen.lock().await.len() == 1
    })
    .await;
    consumer.shutdown().await;
}

#[tokio::test]
async fn acknowledgment_waits_for_the_handler() {
    let bus = Arc::new(InMemoryEventBus::new());
    let gate = Arc::new(Semaphore::new(0));
    let handler = GatedHandler {
        entered: Arc::new(AtomicU32::new(0)),
        gate: Arc::clone(&gate),
        seen: Arc::new(Mutex::new(Vec::new())),
    };
    let entered = Arc::clone(&handler.entered);
    let seen = Arc::clone(&handler.seen);
    let consumer = IntegrationConsumer::new(
        Arc::clone(&bus) as _,
        "payments-integration",
        "bookings",
        Arc::new(handler),
    )
    .start()
    .await
    .expect("start");

    bus.publish("payments-integration", "P1", &confirmed("Payment-P1:0"))
        .await
        .expect("publish");

    // The message is in the handler but not processed; nothing may be
    // acknowledged yet, or a crash here would lose the payment.
    eventually("handler entered", || async {
        entered.load(Ordering::SeqCst) == 1
    })
    .await;
    assert!(bus.acknowledged("payments-integration").is_empty());

    gate.add_permits(1);
    eventually("delivery acknowledged after processing", || async {
        bus.acknowledged("payments-integration") == vec!["Payment-P1:0".to_string()]
    })
    .await;
    assert_eq!(seen.lock().await.clone(), vec!["Payment-P1:0".to_string()]);
    consumer.shutdown().await;
}

#[tokio::test]
async fn unprocessable_events_are_acknowledged_and_skipped() {
    let bus = Arc::new(InMemoryEventBus::new());
    let consumer = IntegrationConsumer::new(
        Arc::clone(&bus) as _,
        "payments-integration",
        "bookings",
        Arc::new(PoisonHandler),
    )
    .start()
    .await
    .expect("start");

    bus.publish("payments-integration", "P1", &confirmed("Payment-P1:0"))
        .await
        .expect("publish");

    // Skipping still acknowledges: the message can never succeed, so it must
    // not come back after a restart.
    eventually("poison delivery acknowledged", || async {
        bus.acknowledged("payments-integration") == vec!["Payment-P1:0".to_string()]
    })
    .await;
    consumer.shutdown().await;
}

#[tokio::test]
async fn redelivery_reaches_the_handler_again() {
    let bus = Arc::new(InMemoryEventBus::new());
    let handler = CountingHandler::default();
    let consumer = IntegrationConsumer::new(
        Arc::clone(&bus) as _,
        "payments-integration",
        "bookings",
        Arc::new(handler.clone()),
    )
    .start()
    .await
    .expect("start");

    bus.publish("payments-integration", "P1", &confirmed("Payment-P1:0"))
        .await
        .expect("publish");
    bus.redeliver("payments-integration").await;

    // At-least-once: the handler sees the same causation id twice and is
    // responsible for deduplicating its effect.
    eventually("both deliveries observed", || async {
        handler.seen.lock().await.len() == 2
    })
    .await;
    consumer.shutdown().await;

    let seen = handler.seen.lock().await.clone();
    assert_eq!(seen[0], seen[1]);
}
