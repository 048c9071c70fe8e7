//! Command handling for bookings.

use crate::domain::{Booking, BookingEvent, Money, StayPeriod};
use crate::ports::{CurrencyConverter, RoomAvailability};
use roomline_core::aggregate::Aggregate;
use roomline_core::command::{Decide, DomainRuleViolation};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Commands accepted by the bookings context.
#[derive(Clone, Debug)]
pub enum BookingCommand {
    /// Book a room for a guest.
    BookRoom {
        /// The guest making the booking.
        guest_id: String,
        /// The room to book.
        room_id: String,
        /// The stay.
        period: StayPeriod,
        /// Total price for the stay.
        price: Money,
    },
    /// Apply a payment from the Payments context.
    RecordPayment {
        /// Payment identifier, used for duplicate detection.
        payment_id: String,
        /// Amount paid, in any supported currency.
        amount: Money,
    },
    /// Cancel the booking.
    CancelBooking {
        /// Why the booking is cancelled.
        reason: String,
    },
}

/// Decider for the [`Booking`] aggregate.
///
/// Availability and conversion are injected ports; the decider itself writes
/// nothing and can be re-run safely when an append conflicts.
pub struct BookingsDecider {
    availability: Arc<dyn RoomAvailability>,
    converter: Arc<dyn CurrencyConverter>,
}

impl BookingsDecider {
    /// Build a decider over the given capability ports.
    #[must_use]
    pub fn new(availability: Arc<dyn RoomAvailability>, converter: Arc<dyn CurrencyConverter>) -> Self {
        Self {
            availability,
            converter,
        }
    }

    async fn book_room(
        &self,
        state: &Booking,
        guest_id: &str,
        room_id: &str,
        period: &StayPeriod,
        price: &Money,
    ) -> Result<Vec<BookingEvent>, DomainRuleViolation> {
        if state.is_booked() {
            return Err(DomainRuleViolation::new("booking already exists"));
        }
        if period.nights() <= 0 {
            return Err(DomainRuleViolation::new("check-out must be after check-in"));
        }
        if price.amount <= 0.0 {
            return Err(DomainRuleViolation::new("price must be positive"));
        }
        if !self.availability.is_room_available(room_id, period).await {
            return Err(DomainRuleViolation::new(format!(
                "room {room_id} is not available for the requested period"
            )));
        }
        Ok(vec![BookingEvent::RoomBooked {
            guest_id: guest_id.to_string(),
            room_id: room_id.to_string(),
            period: *period,
            price: price.clone(),
        }])
    }

    fn record_payment(
        &self,
        state: &Booking,
        payment_id: &str,
        amount: &Money,
    ) -> Result<Vec<BookingEvent>, DomainRuleViolation> {
        // No decision on an unbooked state: against a missing stream the
        // command service reports StreamNotFound, which the integration
        // consumer treats as a retryable ordering race.
        if !state.is_booked() {
            return Ok(vec![]);
        }
        if state.cancelled {
            return Err(DomainRuleViolation::new(
                "cannot record a payment on a cancelled booking",
            ));
        }
        if state.has_payment(payment_id) {
            return Ok(vec![]);
        }

        let currency = state
            .price
            .as_ref()
            .map_or("EUR", |price| price.currency.as_str());
        let applied = self.converter.convert(amount, currency);
        if applied.amount <= 0.0 {
            return Err(DomainRuleViolation::new("payment amount must be positive"));
        }

        let mut events = vec![BookingEvent::PaymentRecorded {
            payment_id: payment_id.to_string(),
            amount: applied.clone(),
        }];
        if !state.fully_paid && applied.amount >= state.outstanding() {
            events.push(BookingEvent::BookingFullyPaid {});
        }
        Ok(events)
    }

    fn cancel(&self, state: &Booking, reason: &str) -> Vec<BookingEvent> {
        if !state.is_booked() || state.cancelled {
            return vec![];
        }
        vec![BookingEvent::BookingCancelled {
            guest_id: state.guest_id.clone(),
            reason: reason.to_string(),
        }]
    }
}

impl Decide<Booking> for BookingsDecider {
    type Command = BookingCommand;

    fn decide<'a>(
        &'a self,
        state: &'a Booking,
        command: &'a Self::Command,
    ) -> Pin<
        Box<
            dyn Future<Output = Result<Vec<<Booking as Aggregate>::Event>, DomainRuleViolation>>
                + Send
                + 'a,
        >,
    > {
        Box::pin(async move {
            match command {
                BookingCommand::BookRoom {
                    guest_id,
                    room_id,
                    period,
                    price,
                } => self.book_room(state, guest_id, room_id, period, price).await,
                BookingCommand::RecordPayment { payment_id, amount } => {
                    self.record_payment(state, payment_id, amount)
                }
                BookingCommand::CancelBooking { reason } => Ok(self.cancel(state, reason)),
            }
        })
    }
}
