//! The booking aggregate and its events.

use chrono::NaiveDate;
use roomline_core::aggregate::Aggregate;
use roomline_core::event::Event;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// An amount of money in a named currency.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Money {
    /// The amount, in major units of the currency.
    pub amount: f64,
    /// ISO 4217 currency code.
    pub currency: String,
}

impl Money {
    /// A zero amount in the given currency.
    #[must_use]
    pub fn zero(currency: &str) -> Self {
        Self {
            amount: 0.0,
            currency: currency.to_string(),
        }
    }
}

/// The dates of a stay, check-out exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StayPeriod {
    /// Arrival date.
    pub check_in: NaiveDate,
    /// Departure date. Must be after `check_in`.
    pub check_out: NaiveDate,
}

impl StayPeriod {
    /// Number of nights in the stay.
    #[must_use]
    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days()
    }
}

/// Everything that can happen to a booking.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum BookingEvent {
    /// A guest booked a room for a period at an agreed price.
    RoomBooked {
        /// The guest who made the booking.
        guest_id: String,
        /// The room that was booked.
        room_id: String,
        /// The stay.
        period: StayPeriod,
        /// Agreed total price for the stay.
        price: Money,
    },
    /// A payment was applied to the booking's outstanding amount.
    PaymentRecorded {
        /// Identifier of the payment in the Payments context.
        payment_id: String,
        /// Amount applied, in the booking's currency.
        amount: Money,
    },
    /// Recorded payments now cover the full price.
    BookingFullyPaid {},
    /// The booking was cancelled.
    BookingCancelled {
        /// The guest who held the booking.
        guest_id: String,
        /// Why it was cancelled.
        reason: String,
    },
}

impl Event for BookingEvent {
    fn event_type(&self) -> &'static str {
        match self {
            Self::RoomBooked { .. } => "RoomBooked.v1",
            Self::PaymentRecorded { .. } => "PaymentRecorded.v1",
            Self::BookingFullyPaid {} => "BookingFullyPaid.v1",
            Self::BookingCancelled { .. } => "BookingCancelled.v1",
        }
    }
}

/// Replayed state of a single booking.
#[derive(Clone, Debug, Default)]
pub struct Booking {
    /// The guest holding the booking, once booked.
    pub guest_id: String,
    /// The booked room, once booked.
    pub room_id: String,
    /// Agreed price, once booked.
    pub price: Option<Money>,
    /// Sum of recorded payments.
    pub amount_paid: f64,
    /// Payments already applied, for duplicate detection.
    pub payment_ids: HashSet<String>,
    /// Whether payments cover the price.
    pub fully_paid: bool,
    /// Whether the booking was cancelled.
    pub cancelled: bool,
}

impl Booking {
    /// True once a `RoomBooked` event has been applied.
    #[must_use]
    pub fn is_booked(&self) -> bool {
        self.price.is_some()
    }

    /// The amount still owed, zero when unbooked.
    #[must_use]
    pub fn outstanding(&self) -> f64 {
        self.price
            .as_ref()
            .map_or(0.0, |price| price.amount - self.amount_paid)
    }

    /// Whether a payment with this identifier was already recorded.
    #[must_use]
    pub fn has_payment(&self, payment_id: &str) -> bool {
        self.payment_ids.contains(payment_id)
    }
}

impl Aggregate for Booking {
    type Event = BookingEvent;

    fn aggregate_type() -> &'static str {
        "Booking"
    }

    fn apply(&mut self, event: &Self::Event) {
        match event {
            BookingEvent::RoomBooked {
                guest_id,
                room_id,
                price,
                ..
            } => {
                self.guest_id.clone_from(guest_id);
                self.room_id.clone_from(room_id);
                self.price = Some(price.clone());
            }
            BookingEvent::PaymentRecorded {
                payment_id, amount, ..
            } => {
                self.amount_paid += amount.amount;
                self.payment_ids.insert(payment_id.clone());
            }
            BookingEvent::BookingFullyPaid {} => self.fully_paid = true,
            BookingEvent::BookingCancelled { .. } => self.cancelled = true,
        }
    }
}
