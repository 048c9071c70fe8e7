//! Scriptable event handlers and a recording dead-letter sink.

use roomline_core::event::RecordedEvent;
use roomline_core::handler::{DeadLetterError, DeadLetterSink, EventHandler, HandlerError};
use roomline_core::stream::GlobalPosition;
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::RwLock;

/// An [`EventHandler`] that records what it sees and fails on demand.
///
/// Failures are scripted up front: a number of transient failures to emit
/// before succeeding, and a set of event types that are always poison.
#[derive(Clone)]
pub struct RecordingHandler {
    name: &'static str,
    seen: Arc<RwLock<Vec<RecordedEvent>>>,
    transient_failures: Arc<AtomicU32>,
    poison_types: Arc<RwLock<HashSet<String>>>,
}

impl RecordingHandler {
    /// Create a handler that always succeeds.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            seen: Arc::new(RwLock::new(Vec::new())),
            transient_failures: Arc::new(AtomicU32::new(0)),
            poison_types: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    /// Fail the next `count` invocations with a transient error.
    #[must_use]
    pub fn failing_transiently(self, count: u32) -> Self {
        self.transient_failures.store(count, Ordering::SeqCst);
        self
    }

    /// Treat `event_type` as poison forever.
    #[must_use]
    pub async fn poisoned_by(self, event_type: &str) -> Self {
        self.poison_types.write().await.insert(event_type.to_string());
        self
    }

    /// Events successfully handled, in order.
    pub async fn seen(&self) -> Vec<RecordedEvent> {
        self.seen.read().await.clone()
    }

    /// Global positions successfully handled, in order.
    pub async fn positions(&self) -> Vec<GlobalPosition> {
        self.seen.read().await.iter().map(|e| e.global_position).collect()
    }
}

impl EventHandler for RecordingHandler {
    fn name(&self) -> &'static str {
        self.name
    }

    fn handle<'a>(
        &'a self,
        event: &'a RecordedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + 'a>> {
        Box::pin(async move {
            if self.poison_types.read().await.contains(&event.event_type) {
                return Err(HandlerError::Poison(format!(
                    "scripted poison for {}",
                    event.event_type
                )));
            }
            if self
                .transient_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(HandlerError::Transient("scripted outage".to_string()));
            }
            self.seen.write().await.push(event.clone());
            Ok(())
        })
    }
}

/// A parked event captured by [`RecordingDeadLetterSink`].
#[derive(Clone, Debug)]
pub struct DeadLetter {
    /// Handler that gave up on the event.
    pub handler: String,
    /// The event itself.
    pub event: RecordedEvent,
    /// Final failure message.
    pub reason: String,
    /// How many times the handler was tried.
    pub attempts: u32,
}

/// A [`DeadLetterSink`] that keeps parked events in memory.
#[derive(Clone, Default)]
pub struct RecordingDeadLetterSink {
    letters: Arc<RwLock<Vec<DeadLetter>>>,
}

impl RecordingDeadLetterSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything parked so far.
    pub async fn letters(&self) -> Vec<DeadLetter> {
        self.letters.read().await.clone()
    }
}

impl DeadLetterSink for RecordingDeadLetterSink {
    fn record<'a>(
        &'a self,
        handler: &'a str,
        event: &'a RecordedEvent,
        reason: &'a str,
        attempts: u32,
    ) -> Pin<Box<dyn Future<Output = Result<(), DeadLetterError>> + Send + 'a>> {
        Box::pin(async move {
            self.letters.write().await.push(DeadLetter {
                handler: handler.to_string(),
                event: event.clone(),
                reason: reason.to_string(),
                attempts,
            });
            Ok(())
        })
    }
}
