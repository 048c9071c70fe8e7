//! Event handlers invoked by the catch-up subscription engine, and the
//! dead-letter sink for events a handler cannot digest.
//!
//! Handlers are registered as an explicit ordered list at startup and called
//! in registration order for every event. Delivery is at-least-once: every
//! handler must tolerate seeing the same event again after a restart.

use crate::event::RecordedEvent;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Failure of a single handler invocation.
#[derive(Error, Debug)]
pub enum HandlerError {
    /// Likely to succeed on retry (store hiccup, broker timeout). The lane
    /// retries with backoff and the checkpoint does not advance past the
    /// event meanwhile.
    #[error("transient handler failure: {0}")]
    Transient(String),

    /// Will never succeed (undecodable payload, impossible state). Routed to
    /// the dead-letter sink once the attempt bound is reached.
    #[error("poison event: {0}")]
    Poison(String),
}

/// A consumer of recorded events.
///
/// Implementations must be idempotent: applying the same event twice must
/// leave the same state as applying it once (guard writes with the event's
/// global position, or upsert by a natural key).
pub trait EventHandler: Send + Sync {
    /// Name used in logs and dead-letter records.
    fn name(&self) -> &'static str;

    /// Process one event.
    fn handle<'a>(
        &'a self,
        event: &'a RecordedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + 'a>>;
}

/// Error writing to the dead-letter sink.
#[derive(Error, Debug)]
#[error("dead-letter sink unavailable: {0}")]
pub struct DeadLetterError(pub String);

/// Durable parking for events a handler kept failing on.
///
/// Recording an event here is the only way the engine ever advances past a
/// failing event; without a sink the lane stays blocked and keeps retrying.
pub trait DeadLetterSink: Send + Sync {
    /// Persist the failed event with enough context to triage it later.
    ///
    /// # Errors
    ///
    /// Returns [`DeadLetterError`] when the sink itself is unavailable; the
    /// engine then keeps the lane blocked rather than losing the event.
    fn record<'a>(
        &'a self,
        handler: &'a str,
        event: &'a RecordedEvent,
        reason: &'a str,
        attempts: u32,
    ) -> Pin<Box<dyn Future<Output = Result<(), DeadLetterError>> + Send + 'a>>;
}
