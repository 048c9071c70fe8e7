//! # roomline-subscriptions
//!
//! The catch-up subscription engine and the integration pair built on it.
//!
//! A subscription replays the global log from its durable checkpoint, then
//! tails new commits indefinitely. Work is partitioned into lanes by stream
//! id, so per-stream order is strict while independent streams run
//! concurrently; the checkpoint only advances to the minimum position all
//! lanes have drained. Delivery is at-least-once end to end: handlers are
//! retried in place, optionally parked in a dead-letter sink, and never
//! silently skipped.
//!
//! On top of the engine sit the two halves of the cross-context bridge:
//! [`gateway::IntegrationGateway`] (a handler that publishes transformed
//! events to the broker) and [`consumer::IntegrationConsumer`] (the loop that
//! turns received integration events into local commands).

pub mod consumer;
pub mod engine;
pub mod gateway;
pub mod progress;

mod lane;

pub use consumer::{ConsumerHandle, IntegrationConsumer, IntegrationHandler};
pub use engine::{SubscriptionBuilder, SubscriptionError, SubscriptionHandle, subscription};
pub use gateway::IntegrationGateway;
