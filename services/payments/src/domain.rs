//! The Payment aggregate.

use roomline_core::aggregate::Aggregate;
use roomline_core::event::Event;
use serde::{Deserialize, Serialize};

/// Events recorded by the Payment aggregate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PaymentEvent {
    /// The payment was authorized and captured.
    PaymentCaptured {
        /// Booking this payment pays for.
        booking_id: String,
        /// Captured amount.
        amount: f64,
        /// ISO currency code.
        currency: String,
    },
    /// The payment was declined by the processor.
    PaymentDeclined {
        /// Booking this payment was meant for.
        booking_id: String,
        /// Processor-reported reason.
        reason: String,
    },
}

impl Event for PaymentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            Self::PaymentCaptured { .. } => "PaymentCaptured.v1",
            Self::PaymentDeclined { .. } => "PaymentDeclined.v1",
        }
    }
}

/// Processing status of a payment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PaymentStatus {
    /// No processing attempt recorded yet.
    #[default]
    Pending,
    /// Authorized and captured.
    Captured,
    /// Declined by the processor.
    Declined,
}

/// One payment attempt, identified by its payment id.
#[derive(Clone, Debug, Default)]
pub struct Payment {
    /// Booking the payment belongs to.
    pub booking_id: String,
    /// Processing outcome so far.
    pub status: PaymentStatus,
    /// Captured amount, zero until captured.
    pub amount: f64,
    /// Currency of the captured amount.
    pub currency: String,
}

impl Payment {
    /// Whether a processing outcome has been recorded.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.status != PaymentStatus::Pending
    }
}

impl Aggregate for Payment {
    type Event = PaymentEvent;

    fn aggregate_type() -> &'static str {
        "Payment"
    }

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PaymentEvent::PaymentCaptured {
                booking_id,
                amount,
                currency,
            } => {
                self.booking_id.clone_from(booking_id);
                self.status = PaymentStatus::Captured;
                self.amount = *amount;
                self.currency.clone_from(currency);
            }
            PaymentEvent::PaymentDeclined { booking_id, .. } => {
                self.booking_id.clone_from(booking_id);
                self.status = PaymentStatus::Declined;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomline_core::aggregate::AggregateState;
    use roomline_core::event::{EventMetadata, NewEvent};
    use roomline_core::stream::{GlobalPosition, StreamId, Version};

    #[test]
    #[allow(clippy::expect_used)]
    fn capture_settles_the_payment() {
        let event = PaymentEvent::PaymentCaptured {
            booking_id: "B1".to_string(),
            amount: 100.0,
            currency: "EUR".to_string(),
        };
        let encoded = NewEvent::from_event(&event, EventMetadata::root()).expect("encode");
        let recorded = roomline_core::event::RecordedEvent {
            stream_id: StreamId::new("Payment-P1"),
            stream_position: Version::ZERO,
            global_position: GlobalPosition::new(0),
            event_type: encoded.event_type,
            data: encoded.data,
            metadata: encoded.metadata,
        };

        let state = AggregateState::<Payment>::replay(&[recorded]).expect("replay");
        assert!(state.state.is_settled());
        assert_eq!(state.state.status, PaymentStatus::Captured);
        assert_eq!(state.state.booking_id, "B1");
    }
}
