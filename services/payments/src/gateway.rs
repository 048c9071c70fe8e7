//! Outbound mapping from payment domain events to integration events.

use crate::domain::PaymentEvent;
use roomline_core::event::RecordedEvent;
use roomline_core::integration::{IntegrationEvent, IntegrationTransform, TransformError};

/// Wire tag of the confirmation message the Bookings context consumes.
pub const PAYMENT_CONFIRMED: &str = "PaymentConfirmed.v1";

/// Maps `PaymentCaptured` to `PaymentConfirmed.v1`.
///
/// Declines stay inside this context: nothing downstream acts on a payment
/// that never happened, so `PaymentDeclined` is deliberately unmapped.
#[derive(Clone, Copy, Debug, Default)]
pub struct PaymentsGateway;

impl IntegrationTransform for PaymentsGateway {
    fn transform(&self, event: &RecordedEvent) -> Result<Option<IntegrationEvent>, TransformError> {
        if event.event_type != "PaymentCaptured.v1" {
            return Ok(None);
        }
        let decoded: PaymentEvent = event.decode().map_err(|e| TransformError {
            event_type: event.event_type.clone(),
            reason: e.to_string(),
        })?;
        let PaymentEvent::PaymentCaptured {
            booking_id,
            amount,
            currency,
        } = decoded
        else {
            return Err(TransformError {
                event_type: event.event_type.clone(),
                reason: "payload does not match its type tag".to_string(),
            });
        };

        let payment_id = event
            .stream_id
            .as_str()
            .strip_prefix("Payment-")
            .unwrap_or(event.stream_id.as_str());
        let payload = serde_json::json!({
            "paymentId": payment_id,
            "bookingId": booking_id,
            "amount": amount,
            "currency": currency,
        });
        Ok(Some(IntegrationEvent::derived_from(
            event,
            PAYMENT_CONFIRMED,
            1,
            payload,
        )))
    }
}
