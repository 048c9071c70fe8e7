//! Event store abstraction: per-stream appends with optimistic concurrency
//! plus an ordered scan over the global commit log.
//!
//! The append is the single durability point of the whole pipeline. Nothing
//! downstream (projections, integration publishing) is considered to have
//! happened until `append` returns `Ok`.
//!
//! # Implementations
//!
//! - `PostgresEventStore` (`roomline-postgres`): production store.
//! - `InMemoryEventStore` (`roomline-testing`): fast, deterministic tests.
//!
//! # Dyn compatibility
//!
//! The trait returns `Pin<Box<dyn Future>>` instead of using `async fn` so it
//! can be used as `Arc<dyn EventStore>` across the command service and the
//! subscription engine.

use crate::event::{NewEvent, RecordedEvent};
use crate::stream::{ExpectedVersion, GlobalPosition, StreamId, Version};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors surfaced by event store operations.
#[derive(Error, Debug)]
pub enum EventStoreError {
    /// The expected-version precondition did not hold. Transient from the
    /// caller's point of view: reload the aggregate and retry the decision.
    #[error("concurrency conflict on {stream_id}: expected {expected}, stream is at {}",
            actual.map_or_else(|| "no-stream".to_string(), |v| v.to_string()))]
    ConcurrencyConflict {
        /// Stream where the conflict occurred.
        stream_id: StreamId,
        /// Precondition the writer supplied.
        expected: ExpectedVersion,
        /// Actual current version, `None` when the stream does not exist.
        actual: Option<Version>,
    },

    /// An `Exact` precondition named a stream that does not exist. Permanent;
    /// a caller error.
    #[error("stream not found: {0}")]
    StreamNotFound(StreamId),

    /// The backing store could not be reached or failed mid-operation.
    /// Transient; callers retry with backoff.
    #[error("event store unavailable: {0}")]
    Unavailable(String),

    /// Payload or metadata failed to (de)serialize.
    #[error("event store serialization error: {0}")]
    Serialization(String),
}

impl EventStoreError {
    /// Whether the error is worth retrying at the call site.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Result of a successful append.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AppendOutcome {
    /// Stream position of the last event in the committed batch, i.e. the
    /// stream's new tip.
    pub last_version: Version,
    /// Global position of the last event in the committed batch.
    pub last_global_position: GlobalPosition,
}

/// Append-only, per-stream event persistence with a global commit log.
///
/// # Guarantees
///
/// - Stream positions are contiguous from 0 and strictly increasing.
/// - A batch commits atomically: readers never observe part of it.
/// - Global positions are strictly increasing in commit order; `read_all`
///   returns events in that order and can resume from any previously seen
///   position.
pub trait EventStore: Send + Sync {
    /// Append `events` to `stream_id` if `expected` matches the stream's
    /// current version.
    ///
    /// # Errors
    ///
    /// - [`EventStoreError::ConcurrencyConflict`] when the precondition fails.
    /// - [`EventStoreError::StreamNotFound`] when `expected` is
    ///   [`ExpectedVersion::Exact`] and the stream does not exist.
    /// - [`EventStoreError::Unavailable`] on infrastructure failure; the batch
    ///   is either fully committed or not at all.
    fn append(
        &self,
        stream_id: StreamId,
        expected: ExpectedVersion,
        events: Vec<NewEvent>,
    ) -> Pin<Box<dyn Future<Output = Result<AppendOutcome, EventStoreError>> + Send + '_>>;

    /// Read one stream in order, optionally starting from a version
    /// (inclusive). A missing stream yields an empty vector, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`EventStoreError::Unavailable`] or
    /// [`EventStoreError::Serialization`] on infrastructure failure.
    fn read_stream(
        &self,
        stream_id: StreamId,
        from: Option<Version>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<RecordedEvent>, EventStoreError>> + Send + '_>>;

    /// Read a batch of the global log strictly after `after` (or from the
    /// start of the log when `None`), at most `limit` events, in global order.
    ///
    /// The subscription engine pages through the log by feeding the last
    /// received position back in; an empty batch means it is caught up.
    ///
    /// # Errors
    ///
    /// Returns [`EventStoreError::Unavailable`] or
    /// [`EventStoreError::Serialization`] on infrastructure failure.
    fn read_all(
        &self,
        after: Option<GlobalPosition>,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<RecordedEvent>, EventStoreError>> + Send + '_>>;
}
