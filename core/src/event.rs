//! Domain events and their stored representation.
//!
//! Events are immutable facts. Aggregates produce them, the event store
//! assigns them positions, and everything downstream (projections, the
//! integration gateway) consumes them as [`RecordedEvent`]s.
//!
//! Payloads are serialized with `bincode` (the closed `serde` enum per
//! aggregate is the type registry: the `event_type()` tag identifies the
//! schema, the enum identifies the decoder). Metadata travels separately as
//! JSON so infrastructure can read it without knowing the payload type.

use crate::stream::{GlobalPosition, StreamId, Version};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::fmt;
use thiserror::Error;

/// Errors for event serialization and decoding.
#[derive(Error, Debug)]
pub enum EventError {
    /// Failed to serialize an event payload.
    #[error("failed to serialize event: {0}")]
    Serialization(String),

    /// Failed to deserialize an event payload.
    #[error("failed to deserialize event of type {event_type}: {reason}")]
    Deserialization {
        /// The stored event type tag.
        event_type: String,
        /// What went wrong.
        reason: String,
    },
}

/// A domain event that can be appended to a stream and replayed.
///
/// Implementations are closed `serde` enums, one per aggregate, with a stable
/// versioned tag per variant (`"RoomBooked.v1"`). The tag is stored next to
/// the payload and is the contract for replay and for the integration
/// gateway's mapping table.
pub trait Event: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Stable, versioned type tag for this event.
    fn event_type(&self) -> &'static str;

    /// Serialize the payload to bytes.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Serialization`] when encoding fails.
    fn to_bytes(&self) -> Result<Vec<u8>, EventError> {
        bincode::serialize(self).map_err(|e| EventError::Serialization(e.to_string()))
    }

    /// Deserialize a payload previously produced by [`Event::to_bytes`].
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Deserialization`] when decoding fails.
    fn from_bytes(event_type: &str, bytes: &[u8]) -> Result<Self, EventError> {
        bincode::deserialize(bytes).map_err(|e| EventError::Deserialization {
            event_type: event_type.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Causation and correlation metadata attached to every event.
///
/// `correlation_id` ties together everything caused by one external request,
/// across both services. `causation_id` names the immediate cause (the command
/// or the upstream event). Consumers use these for tracing and deduplication.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Id shared by every event in one causal chain.
    pub correlation_id: String,
    /// Id of the direct cause of this event.
    pub causation_id: String,
    /// When the event was recorded.
    pub recorded_at: DateTime<Utc>,
}

impl EventMetadata {
    /// Metadata for the root of a new causal chain.
    #[must_use]
    pub fn root() -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        Self {
            correlation_id: id.clone(),
            causation_id: id,
            recorded_at: Utc::now(),
        }
    }

    /// Metadata for an effect caused by an earlier message.
    #[must_use]
    pub fn caused_by(correlation_id: impl Into<String>, causation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            causation_id: causation_id.into(),
            recorded_at: Utc::now(),
        }
    }
}

/// An event ready to be appended: typed tag, encoded payload, metadata.
///
/// Positions are assigned by the store on commit, never by the writer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewEvent {
    /// Stable, versioned type tag.
    pub event_type: String,
    /// `bincode`-encoded payload.
    pub data: Vec<u8>,
    /// Causation/correlation metadata.
    pub metadata: EventMetadata,
}

impl NewEvent {
    /// Encode a domain event for appending.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Serialization`] when encoding fails.
    pub fn from_event<E: Event>(event: &E, metadata: EventMetadata) -> Result<Self, EventError> {
        Ok(Self {
            event_type: event.event_type().to_string(),
            data: event.to_bytes()?,
            metadata,
        })
    }
}

/// A committed event read back from the store.
///
/// Carries both its per-stream position (contiguous, 0-based) and its
/// position in the service-wide commit log.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecordedEvent {
    /// Stream this event belongs to.
    pub stream_id: StreamId,
    /// Position within the stream.
    pub stream_position: Version,
    /// Position within the global log.
    pub global_position: GlobalPosition,
    /// Stable, versioned type tag.
    pub event_type: String,
    /// `bincode`-encoded payload.
    pub data: Vec<u8>,
    /// Causation/correlation metadata.
    pub metadata: EventMetadata,
}

impl RecordedEvent {
    /// Decode the payload into a concrete event type.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Deserialization`] when the payload does not
    /// decode as `E`.
    pub fn decode<E: Event>(&self) -> Result<E, EventError> {
        E::from_bytes(&self.event_type, &self.data)
    }
}

impl fmt::Display for RecordedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{} ({}, global {})",
            self.stream_id, self.stream_position, self.event_type, self.global_position
        )
    }
}
