//! Read-model projections over the booking streams.
//!
//! Both projections run as handlers on the catch-up subscription and store
//! JSON rows in a [`ReadModelStore`]. Delivery is at-least-once, so each
//! write is guarded to stay idempotent: `BookingStateProjection` keeps the
//! global position of the last event it folded into the row, and
//! `MyBookingsProjection` relies on set semantics plus a cancelled-bookings
//! tombstone list.

use crate::domain::{BookingEvent, Money};
use roomline_core::event::RecordedEvent;
use roomline_core::handler::{EventHandler, HandlerError};
use roomline_core::read_model::{ReadModelError, ReadModelStore};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// One row per booking: the current state, denormalized for display.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BookingStateRow {
    /// Booking identifier (stream id without the aggregate prefix).
    pub booking_id: String,
    /// The guest holding the booking.
    pub guest_id: String,
    /// The booked room.
    pub room_id: String,
    /// Agreed price.
    pub price: Money,
    /// Sum of recorded payments.
    pub amount_paid: f64,
    /// Lifecycle state: `booked`, `fully-paid` or `cancelled`.
    pub status: String,
    /// Global position of the last event folded into this row.
    pub last_applied: u64,
}

/// Projects booking events into one [`BookingStateRow`] per booking.
pub struct BookingStateProjection {
    store: Arc<dyn ReadModelStore>,
}

impl BookingStateProjection {
    /// Key prefix for rows written by this projection.
    pub const KEY_PREFIX: &'static str = "booking-state";

    /// Build the projection over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn ReadModelStore>) -> Self {
        Self { store }
    }

    /// Row key for a booking.
    #[must_use]
    pub fn key(booking_id: &str) -> String {
        format!("{}:{booking_id}", Self::KEY_PREFIX)
    }

    async fn load(&self, key: &str) -> Result<Option<BookingStateRow>, HandlerError> {
        let Some(bytes) = self.store.get(key).await.map_err(transient)? else {
            return Ok(None);
        };
        let row = serde_json::from_slice(&bytes)
            .map_err(|e| HandlerError::Poison(format!("undecodable row at {key}: {e}")))?;
        Ok(Some(row))
    }

    async fn save(&self, key: &str, row: &BookingStateRow) -> Result<(), HandlerError> {
        let bytes = serde_json::to_vec(row)
            .map_err(|e| HandlerError::Poison(format!("row for {key} failed to encode: {e}")))?;
        self.store.save(key, &bytes).await.map_err(transient)
    }

    async fn apply(&self, event: &RecordedEvent) -> Result<(), HandlerError> {
        let decoded: BookingEvent = decode(event)?;
        let booking_id = booking_id_of(event);
        let key = Self::key(booking_id);
        let position = event.global_position.value();

        let existing = self.load(&key).await?;
        if existing
            .as_ref()
            .is_some_and(|row| row.last_applied >= position)
        {
            return Ok(());
        }

        let row = match (existing, decoded) {
            (
                None,
                BookingEvent::RoomBooked {
                    guest_id,
                    room_id,
                    price,
                    ..
                },
            ) => BookingStateRow {
                booking_id: booking_id.to_string(),
                guest_id,
                room_id,
                price,
                amount_paid: 0.0,
                status: "booked".to_string(),
                last_applied: position,
            },
            (Some(mut row), BookingEvent::PaymentRecorded { amount, .. }) => {
                row.amount_paid += amount.amount;
                row.last_applied = position;
                row
            }
            (Some(mut row), BookingEvent::BookingFullyPaid {}) => {
                row.status = "fully-paid".to_string();
                row.last_applied = position;
                row
            }
            (Some(mut row), BookingEvent::BookingCancelled { .. }) => {
                row.status = "cancelled".to_string();
                row.last_applied = position;
                row
            }
            (existing, decoded) => {
                use roomline_core::event::Event;
                return Err(HandlerError::Poison(format!(
                    "event {} does not follow from row state (row present: {})",
                    decoded.event_type(),
                    existing.is_some()
                )));
            }
        };
        self.save(&key, &row).await
    }
}

impl EventHandler for BookingStateProjection {
    fn name(&self) -> &'static str {
        "booking-state"
    }

    fn handle<'a>(
        &'a self,
        event: &'a RecordedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + 'a>> {
        Box::pin(self.apply(event))
    }
}

/// One row per guest: the bookings they currently hold.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MyBookingsRow {
    /// Active booking ids, in booking order.
    pub bookings: Vec<String>,
    /// Cancelled booking ids, kept so a redelivered `RoomBooked` cannot
    /// resurrect a cancelled booking.
    pub cancelled: Vec<String>,
}

/// Projects `RoomBooked` and `BookingCancelled` into one row per guest.
pub struct MyBookingsProjection {
    store: Arc<dyn ReadModelStore>,
}

impl MyBookingsProjection {
    /// Key prefix for rows written by this projection.
    pub const KEY_PREFIX: &'static str = "my-bookings";

    /// Build the projection over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn ReadModelStore>) -> Self {
        Self { store }
    }

    /// Row key for a guest.
    #[must_use]
    pub fn key(guest_id: &str) -> String {
        format!("{}:{guest_id}", Self::KEY_PREFIX)
    }

    async fn apply(&self, event: &RecordedEvent) -> Result<(), HandlerError> {
        let (guest_id, booking_id, cancelled) = match decode::<BookingEvent>(event)? {
            BookingEvent::RoomBooked { guest_id, .. } => {
                (guest_id, booking_id_of(event).to_string(), false)
            }
            BookingEvent::BookingCancelled { guest_id, .. } => {
                (guest_id, booking_id_of(event).to_string(), true)
            }
            // Payment progress does not change what a guest holds.
            _ => return Ok(()),
        };

        let key = Self::key(&guest_id);
        let mut row: MyBookingsRow = match self.store.get(&key).await.map_err(transient)? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| HandlerError::Poison(format!("undecodable row at {key}: {e}")))?,
            None => MyBookingsRow::default(),
        };

        if cancelled {
            row.bookings.retain(|id| id != &booking_id);
            if !row.cancelled.contains(&booking_id) {
                row.cancelled.push(booking_id);
            }
        } else if !row.bookings.contains(&booking_id) && !row.cancelled.contains(&booking_id) {
            row.bookings.push(booking_id);
        }

        let bytes = serde_json::to_vec(&row)
            .map_err(|e| HandlerError::Poison(format!("row for {key} failed to encode: {e}")))?;
        self.store.save(&key, &bytes).await.map_err(transient)
    }
}

impl EventHandler for MyBookingsProjection {
    fn name(&self) -> &'static str {
        "my-bookings"
    }

    fn handle<'a>(
        &'a self,
        event: &'a RecordedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + 'a>> {
        Box::pin(self.apply(event))
    }
}

fn decode<E: roomline_core::event::Event>(event: &RecordedEvent) -> Result<E, HandlerError> {
    event
        .decode()
        .map_err(|e| HandlerError::Poison(format!("undecodable {}: {e}", event.event_type)))
}

fn booking_id_of(event: &RecordedEvent) -> &str {
    event
        .stream_id
        .as_str()
        .strip_prefix("Booking-")
        .unwrap_or(event.stream_id.as_str())
}

fn transient(err: ReadModelError) -> HandlerError {
    HandlerError::Transient(err.to_string())
}
