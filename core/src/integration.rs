//! Integration events: the wire-stable messages that cross context
//! boundaries.
//!
//! Not every domain event leaves its service. The producer-side gateway runs
//! each recorded event through an [`IntegrationTransform`], a pure mapping
//! from domain event type to at most one integration event, and publishes
//! the result to the broker. Payloads are JSON so the receiving context can
//! evolve independently of the producer's internal types.

use crate::event::RecordedEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error building an integration event from a domain event.
#[derive(Error, Debug)]
#[error("integration transform failed for {event_type}: {reason}")]
pub struct TransformError {
    /// Domain event type being transformed.
    pub event_type: String,
    /// What went wrong.
    pub reason: String,
}

/// A versioned, cross-context message derived from one domain event.
///
/// `causation_id` is the identity of the originating domain event and doubles
/// as the consumer's dedupe key under at-least-once delivery.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntegrationEvent {
    /// Stable wire tag, e.g. `"PaymentConfirmed.v1"`.
    pub event_type: String,
    /// Schema version of the payload.
    pub schema_version: u16,
    /// JSON payload with a stable, documented shape.
    pub payload: serde_json::Value,
    /// Correlation id carried over from the domain event.
    pub correlation_id: String,
    /// Identity of the originating domain event (dedupe key).
    pub causation_id: String,
    /// When the originating event was recorded.
    pub occurred_at: DateTime<Utc>,
}

impl IntegrationEvent {
    /// Build an integration event derived from `source`.
    #[must_use]
    pub fn derived_from(
        source: &RecordedEvent,
        event_type: impl Into<String>,
        schema_version: u16,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            schema_version,
            payload,
            correlation_id: source.metadata.correlation_id.clone(),
            causation_id: format!("{}:{}", source.stream_id, source.stream_position),
            occurred_at: source.metadata.recorded_at,
        }
    }
}

/// Declarative mapping from domain events to integration events.
///
/// `Ok(None)` means the event type does not cross the boundary and nothing is
/// published. The transform must be pure: same recorded event in, same
/// integration event (or skip) out.
pub trait IntegrationTransform: Send + Sync {
    /// Map one recorded domain event to at most one integration event.
    ///
    /// # Errors
    ///
    /// Returns [`TransformError`] when a mapped event's payload cannot be
    /// built (e.g. the stored payload fails to decode).
    fn transform(&self, event: &RecordedEvent) -> Result<Option<IntegrationEvent>, TransformError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventMetadata;
    use crate::stream::{GlobalPosition, StreamId, Version};

    #[test]
    fn derived_event_carries_correlation_and_dedupe_key() {
        let source = RecordedEvent {
            stream_id: StreamId::new("Payment-P1"),
            stream_position: Version::ZERO,
            global_position: GlobalPosition::new(7),
            event_type: "PaymentCaptured.v1".to_string(),
            data: vec![],
            metadata: EventMetadata::caused_by("corr-1", "cmd-1"),
        };

        let integration = IntegrationEvent::derived_from(
            &source,
            "PaymentConfirmed.v1",
            1,
            serde_json::json!({ "paymentId": "P1" }),
        );

        assert_eq!(integration.correlation_id, "corr-1");
        assert_eq!(integration.causation_id, "Payment-P1:0");
        assert_eq!(integration.schema_version, 1);
    }
}
