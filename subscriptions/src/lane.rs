//! Lane workers: per-partition, in-order delivery to handlers.
//!
//! A lane owns every stream that hashes to it. Events arrive over a bounded
//! channel in global-log order and are resolved one at a time, so per-stream
//! order holds no matter how many lanes run concurrently. A failing event
//! blocks its lane; later events in the same stream never overtake it.

use crate::progress::ProgressTracker;
use roomline_core::event::RecordedEvent;
use roomline_core::handler::{DeadLetterSink, EventHandler, HandlerError};
use roomline_runtime::retry::RetryPolicy;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// Delivery was cut short by shutdown; the event stays unacknowledged.
pub(crate) struct Interrupted;

pub(crate) struct Lane {
    pub(crate) subscription_id: Arc<str>,
    pub(crate) index: usize,
    pub(crate) handlers: Arc<Vec<Arc<dyn EventHandler>>>,
    pub(crate) progress: Arc<Mutex<ProgressTracker>>,
    pub(crate) retry_policy: RetryPolicy,
    pub(crate) max_attempts: u32,
    pub(crate) dead_letter: Option<Arc<dyn DeadLetterSink>>,
    pub(crate) shutdown: watch::Receiver<bool>,
}

impl Lane {
    pub(crate) fn spawn(self, events: mpsc::Receiver<RecordedEvent>) -> JoinHandle<()> {
        tokio::spawn(self.run(events))
    }

    async fn run(mut self, mut events: mpsc::Receiver<RecordedEvent>) {
        loop {
            let event = tokio::select! {
                biased;
                _ = self.shutdown.changed() => break,
                received = events.recv() => match received {
                    Some(event) => event,
                    None => break,
                },
            };
            match self.deliver(&event).await {
                Ok(()) => {
                    self.progress.lock().await.acknowledged(event.global_position);
                }
                Err(Interrupted) => break,
            }
        }
        tracing::debug!(
            subscription_id = %self.subscription_id,
            lane = self.index,
            "lane stopped"
        );
    }

    /// Run every registered handler for `event`, in registration order.
    ///
    /// Returns only once each handler has either succeeded or been parked in
    /// the dead-letter sink; the event is never skipped.
    async fn deliver(&mut self, event: &RecordedEvent) -> Result<(), Interrupted> {
        let handlers = Arc::clone(&self.handlers);
        for handler in handlers.iter() {
            self.resolve(handler.as_ref(), event).await?;
        }
        Ok(())
    }

    async fn resolve(
        &mut self,
        handler: &dyn EventHandler,
        event: &RecordedEvent,
    ) -> Result<(), Interrupted> {
        let mut attempts: u32 = 0;
        loop {
            let failure = match handler.handle(event).await {
                Ok(()) => return Ok(()),
                Err(failure) => failure,
            };
            attempts += 1;

            let exhausted = match failure {
                HandlerError::Poison(_) => true,
                HandlerError::Transient(_) => attempts >= self.max_attempts,
            };
            if exhausted {
                if self.park(handler.name(), event, &failure, attempts).await {
                    return Ok(());
                }
                tracing::error!(
                    subscription_id = %self.subscription_id,
                    lane = self.index,
                    handler = handler.name(),
                    global_position = %event.global_position,
                    error = %failure,
                    "event cannot be resolved, lane blocked until it can"
                );
            } else {
                tracing::warn!(
                    subscription_id = %self.subscription_id,
                    lane = self.index,
                    handler = handler.name(),
                    global_position = %event.global_position,
                    attempts,
                    error = %failure,
                    "handler failed, retrying"
                );
            }

            let delay = self.retry_policy.delay_for_attempt(attempts as usize);
            tokio::select! {
                biased;
                _ = self.shutdown.changed() => return Err(Interrupted),
                () = sleep(delay) => {}
            }
        }
    }

    /// Park the event in the dead-letter sink, if one is configured.
    ///
    /// Returns whether the lane may advance past the event.
    async fn park(
        &self,
        handler: &str,
        event: &RecordedEvent,
        failure: &HandlerError,
        attempts: u32,
    ) -> bool {
        let Some(sink) = &self.dead_letter else {
            return false;
        };
        match sink.record(handler, event, &failure.to_string(), attempts).await {
            Ok(()) => {
                tracing::error!(
                    subscription_id = %self.subscription_id,
                    handler,
                    stream_id = %event.stream_id,
                    global_position = %event.global_position,
                    attempts,
                    error = %failure,
                    "event parked in dead-letter sink"
                );
                true
            }
            Err(sink_error) => {
                tracing::error!(
                    subscription_id = %self.subscription_id,
                    handler,
                    global_position = %event.global_position,
                    error = %sink_error,
                    "dead-letter sink unavailable, keeping the event in the lane"
                );
                false
            }
        }
    }
}
