//! # roomline-postgres
//!
//! PostgreSQL implementations of the `roomline-core` persistence contracts:
//! the event store (append-only log with optimistic concurrency), the
//! checkpoint store, generic read-model storage and the dead-letter sink.
//! [`schema::create_schema`] provisions all of their tables for local
//! development.

pub mod checkpoint_store;
pub mod dead_letter;
pub mod event_store;
pub mod read_model;
pub mod schema;

pub use checkpoint_store::PostgresCheckpointStore;
pub use dead_letter::PostgresDeadLetterSink;
pub use event_store::PostgresEventStore;
pub use read_model::PostgresReadModelStore;
pub use schema::create_schema;
