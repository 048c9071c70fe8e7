//! Broker-side integration consumer.
//!
//! The consumer pulls integration events off a topic and hands each one to a
//! local handler, typically a thin mapping onto the context's command
//! service. Delivery is at-least-once: the handler must be idempotent, and
//! transient failures are retried in place. A delivery is acknowledged to
//! the broker only after the handler has resolved it, so a crash mid-flight
//! means redelivery, never a lost message.

use futures::StreamExt;
use roomline_core::event_bus::{EventBus, EventBusError};
use roomline_core::handler::HandlerError;
use roomline_core::integration::IntegrationEvent;
use roomline_runtime::retry::RetryPolicy;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// A consumer of integration events.
///
/// Implementations map known event types onto local commands and return
/// `Ok(())` for types they do not recognize; unknown messages are not an
/// error, just a contract the other context added later.
pub trait IntegrationHandler: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Process one integration event.
    fn handle<'a>(
        &'a self,
        event: &'a IntegrationEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + 'a>>;
}

/// Long-lived consumer loop for one topic/group pair.
pub struct IntegrationConsumer {
    bus: Arc<dyn EventBus>,
    topic: String,
    group: String,
    handler: Arc<dyn IntegrationHandler>,
    retry_policy: RetryPolicy,
}

impl IntegrationConsumer {
    /// Create a consumer for `topic`, joining the consumer group `group`.
    #[must_use]
    pub fn new(
        bus: Arc<dyn EventBus>,
        topic: impl Into<String>,
        group: impl Into<String>,
        handler: Arc<dyn IntegrationHandler>,
    ) -> Self {
        Self {
            bus,
            topic: topic.into(),
            group: group.into(),
            handler,
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Override the backoff policy for transient handler failures.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Subscribe and start consuming on a background task.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError`] when the subscription cannot be established.
    pub async fn start(self) -> Result<ConsumerHandle, EventBusError> {
        let mut stream = self.bus.subscribe(&self.topic, &self.group).await?;
        tracing::info!(topic = %self.topic, group = %self.group, "integration consumer started");

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(async move {
            loop {
                let delivery = tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => break,
                    delivery = stream.next() => delivery,
                };
                match delivery {
                    None => {
                        tracing::warn!(topic = %self.topic, "broker stream ended");
                        break;
                    }
                    Some(Err(error)) => {
                        tracing::warn!(
                            topic = %self.topic,
                            error = %error,
                            "broker delivery error, continuing"
                        );
                    }
                    Some(Ok(delivery)) => {
                        // Acknowledge only once the handler has resolved the
                        // event; an unacknowledged delivery is redelivered
                        // after a restart.
                        if self.process(&delivery.event, &mut shutdown_rx).await.is_err() {
                            break;
                        }
                        delivery.ack();
                    }
                }
            }
            tracing::info!(topic = %self.topic, group = %self.group, "integration consumer stopped");
        });
        Ok(ConsumerHandle {
            shutdown: shutdown_tx,
            join,
        })
    }

    /// Resolve one delivery. Transient failures retry with backoff until they
    /// clear or shutdown cuts them short; only then does the loop move on, so
    /// an unprocessed message is redelivered rather than dropped.
    async fn process(
        &self,
        event: &IntegrationEvent,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), ()> {
        let mut attempts: usize = 0;
        loop {
            match self.handler.handle(event).await {
                Ok(()) => return Ok(()),
                Err(HandlerError::Poison(reason)) => {
                    tracing::error!(
                        topic = %self.topic,
                        handler = self.handler.name(),
                        event_type = %event.event_type,
                        causation_id = %event.causation_id,
                        reason,
                        "integration event cannot be processed, skipping"
                    );
                    return Ok(());
                }
                Err(HandlerError::Transient(reason)) => {
                    let delay = self.retry_policy.delay_for_attempt(attempts);
                    attempts += 1;
                    tracing::warn!(
                        topic = %self.topic,
                        handler = self.handler.name(),
                        causation_id = %event.causation_id,
                        attempts,
                        delay_ms = delay.as_millis(),
                        reason,
                        "integration handler failed, retrying"
                    );
                    tokio::select! {
                        biased;
                        _ = shutdown.changed() => return Err(()),
                        () = sleep(delay) => {}
                    }
                }
            }
        }
    }
}

/// A running integration consumer.
pub struct ConsumerHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl ConsumerHandle {
    /// Stop consuming and wait for the loop to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.join.await;
    }
}
