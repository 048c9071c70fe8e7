//! # roomline-core
//!
//! Core traits and types for the roomline event-sourced services.
//!
//! Roomline is an event-sourced CQRS platform split into two bounded
//! contexts, Bookings and Payments, that communicate only through durable
//! event streams and an asynchronous broker. This crate defines the contracts
//! both services are built on:
//!
//! - [`event`] / [`stream`]: immutable events, stream versions, global log
//!   positions and the [`stream::ExpectedVersion`] append precondition.
//! - [`event_store`]: append-only per-stream persistence with optimistic
//!   concurrency and an ordered global-log scan.
//! - [`aggregate`] / [`command`]: fold-based state rebuilding and the
//!   decide contract used by the command service.
//! - [`checkpoint`]: durable per-subscription cursors.
//! - [`handler`]: the event-handler contract used by catch-up subscriptions,
//!   plus the dead-letter sink.
//! - [`read_model`]: upsert-by-key storage for projections.
//! - [`integration`] / [`event_bus`]: cross-context messages and the broker
//!   they travel on.
//!
//! Production implementations live in `roomline-postgres` and
//! `roomline-redpanda`; in-memory test doubles live in `roomline-testing`.

pub mod aggregate;
pub mod checkpoint;
pub mod command;
pub mod event;
pub mod event_bus;
pub mod event_store;
pub mod handler;
pub mod integration;
pub mod read_model;
pub mod stream;

pub use aggregate::{Aggregate, AggregateState};
pub use checkpoint::{CheckpointError, CheckpointStore};
pub use command::{CommandError, Committed, Decide, DomainRuleViolation};
pub use event::{Event, EventError, EventMetadata, NewEvent, RecordedEvent};
pub use event_bus::{Delivery, EventBus, EventBusError, IntegrationStream};
pub use event_store::{AppendOutcome, EventStore, EventStoreError};
pub use handler::{DeadLetterError, DeadLetterSink, EventHandler, HandlerError};
pub use integration::{IntegrationEvent, IntegrationTransform, TransformError};
pub use read_model::{ReadModelError, ReadModelStore};
pub use stream::{ExpectedVersion, GlobalPosition, StreamId, Version};
