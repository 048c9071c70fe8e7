//! Stream identification, versioning and global-log positions.
//!
//! This module defines the strong types used throughout the event store:
//! [`StreamId`] names one aggregate instance's stream, [`Version`] is the
//! 0-based position of an event within its stream, [`GlobalPosition`] is the
//! position of an event in the service-wide commit log, and
//! [`ExpectedVersion`] is the optimistic-concurrency precondition attached to
//! every append.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for an event stream (one aggregate instance).
///
/// Streams are named `{AggregateType}-{id}`, for example `Booking-B1` or
/// `Payment-P42`. A stream holds the full ordered history of a single
/// aggregate and is the unit of optimistic concurrency.
///
/// # Examples
///
/// ```
/// use roomline_core::stream::StreamId;
///
/// let stream = StreamId::for_aggregate("Booking", "B1");
/// assert_eq!(stream.as_str(), "Booking-B1");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamId(String);

impl StreamId {
    /// Create a `StreamId` from a raw string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Create a `StreamId` following the `{AggregateType}-{id}` convention.
    #[must_use]
    pub fn for_aggregate(aggregate_type: &str, id: &str) -> Self {
        Self(format!("{aggregate_type}-{id}"))
    }

    /// Get the stream id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for StreamId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for StreamId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for StreamId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Position of an event within its stream.
///
/// Versions are 0-based and contiguous: the first event of a stream is at
/// version 0, and a stream whose last event sits at version `n` contains
/// exactly `n + 1` events. "No stream yet" is represented by `Option<Version>`
/// being `None`, not by a sentinel value.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version(u64);

impl Version {
    /// Version of the first event in a stream.
    pub const ZERO: Self = Self(0);

    /// Create a `Version` with the given value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the version number.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// The next version (current + 1).
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Version {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Position of an event in the service-wide commit log.
///
/// Global positions are strictly increasing in commit order across all
/// streams. Consumers must treat them as opaque, ordered cursors: checkpoint
/// arithmetic only ever relies on ordering, never on the absence of gaps.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GlobalPosition(u64);

impl GlobalPosition {
    /// Create a `GlobalPosition` with the given value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw position.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for GlobalPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for GlobalPosition {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Optimistic-concurrency precondition for an append.
///
/// Every append names the stream version the writer believes to be current.
/// The store rejects the batch with a concurrency conflict when the
/// precondition does not hold, so contention is detected rather than
/// prevented; there are no locks and no shared counters.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// The stream must not exist yet.
    NoStream,
    /// No check; append to whatever the current version is.
    Any,
    /// The stream's last event must sit exactly at this version.
    Exact(Version),
}

impl fmt::Display for ExpectedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoStream => write!(f, "no-stream"),
            Self::Any => write!(f, "any"),
            Self::Exact(v) => write!(f, "{v}"),
        }
    }
}
