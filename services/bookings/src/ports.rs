//! Capability ports the booking decider depends on.
//!
//! Availability and currency conversion live outside the aggregate; they are
//! injected so tests can script them and production can wire real backends.

use crate::domain::{Money, StayPeriod};
use std::future::Future;
use std::pin::Pin;

/// Answers whether a room can be booked for a period.
pub trait RoomAvailability: Send + Sync {
    /// Check availability. A slow or remote implementation is expected here,
    /// hence the async signature.
    fn is_room_available<'a>(
        &'a self,
        room_id: &'a str,
        period: &'a StayPeriod,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>>;
}

/// Converts money into a target currency.
pub trait CurrencyConverter: Send + Sync {
    /// Convert `amount` into `currency`.
    fn convert(&self, amount: &Money, currency: &str) -> Money;
}

/// Treats every room as available.
///
/// Stands in until an inventory service exists.
#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysAvailable;

impl RoomAvailability for AlwaysAvailable {
    fn is_room_available<'a>(
        &'a self,
        _room_id: &'a str,
        _period: &'a StayPeriod,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        Box::pin(async { true })
    }
}

/// Passes amounts through with the target currency, no rate applied.
///
/// Correct only while every context prices in a single currency.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityConverter;

impl CurrencyConverter for IdentityConverter {
    fn convert(&self, amount: &Money, currency: &str) -> Money {
        Money {
            amount: amount.amount,
            currency: currency.to_string(),
        }
    }
}
