//! # bookings
//!
//! The Bookings bounded context. Room bookings are event-sourced
//! [`domain::Booking`] aggregates; two projections keep query-side rows up to
//! date, and the payments consumer applies `PaymentConfirmed.v1` messages
//! from the Payments context as `RecordPayment` commands.
//!
//! Command submission (the HTTP surface in a full deployment) is external to
//! this crate: callers construct a `CommandService<Booking, BookingsDecider>`
//! and execute [`application::BookingCommand`]s against it.

pub mod application;
pub mod config;
pub mod domain;
pub mod integration;
pub mod ports;
pub mod projections;

pub use application::{BookingCommand, BookingsDecider};
pub use domain::{Booking, BookingEvent, Money, StayPeriod};
pub use integration::{PAYMENT_CONFIRMED, PaymentsIntegrationHandler};
pub use ports::{AlwaysAvailable, CurrencyConverter, IdentityConverter, RoomAvailability};
pub use projections::{BookingStateProjection, MyBookingsProjection};
