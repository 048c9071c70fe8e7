//! Command handling for payments.

use crate::domain::{Payment, PaymentEvent};
use roomline_core::aggregate::Aggregate;
use roomline_core::command::{Decide, DomainRuleViolation};
use std::future::Future;
use std::pin::Pin;

/// Currencies the processor settles in.
const SUPPORTED_CURRENCIES: &[&str] = &["EUR", "USD", "GBP"];

/// Captures above this amount are declined by the (stubbed) processor.
const AUTHORIZATION_LIMIT: f64 = 10_000.0;

/// Commands accepted by the payments context.
#[derive(Clone, Debug)]
pub enum PaymentCommand {
    /// Process a payment for a booking.
    ProcessPayment {
        /// Booking being paid for.
        booking_id: String,
        /// Amount to capture.
        amount: f64,
        /// ISO currency code.
        currency: String,
    },
}

/// Decider for the [`Payment`] aggregate.
///
/// Reprocessing a settled payment decides nothing, so redelivered
/// `ProcessPayment` commands are no-ops rather than double charges.
#[derive(Clone, Copy, Debug, Default)]
pub struct PaymentsDecider;

impl Decide<Payment> for PaymentsDecider {
    type Command = PaymentCommand;

    fn decide<'a>(
        &'a self,
        state: &'a Payment,
        command: &'a Self::Command,
    ) -> Pin<
        Box<
            dyn Future<Output = Result<Vec<<Payment as Aggregate>::Event>, DomainRuleViolation>>
                + Send
                + 'a,
        >,
    > {
        Box::pin(async move {
            let PaymentCommand::ProcessPayment {
                booking_id,
                amount,
                currency,
            } = command;

            if state.is_settled() {
                return Ok(vec![]);
            }
            if *amount <= 0.0 {
                return Err(DomainRuleViolation::new("payment amount must be positive"));
            }
            if !SUPPORTED_CURRENCIES.contains(&currency.as_str()) {
                return Err(DomainRuleViolation::new(format!(
                    "unsupported currency: {currency}"
                )));
            }

            // Stand-in for the real processor call.
            if *amount > AUTHORIZATION_LIMIT {
                return Ok(vec![PaymentEvent::PaymentDeclined {
                    booking_id: booking_id.clone(),
                    reason: "amount exceeds authorization limit".to_string(),
                }]);
            }
            Ok(vec![PaymentEvent::PaymentCaptured {
                booking_id: booking_id.clone(),
                amount: *amount,
                currency: currency.clone(),
            }])
        })
    }
}
