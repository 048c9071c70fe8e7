//! Inbound side of the Payments integration.
//!
//! Consumes `PaymentConfirmed.v1` from the broker and turns each one into a
//! `RecordPayment` command. Delivery is at-least-once; idempotency comes from
//! the aggregate's payment-id dedupe, so a redelivered confirmation decides
//! nothing the second time.

use crate::application::{BookingCommand, BookingsDecider};
use crate::domain::{Booking, Money};
use roomline_core::command::CommandError;
use roomline_core::event::EventMetadata;
use roomline_core::handler::HandlerError;
use roomline_core::integration::IntegrationEvent;
use roomline_runtime::service::CommandService;
use roomline_subscriptions::IntegrationHandler;
use serde::Deserialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Wire tag of the confirmation message published by the Payments context.
pub const PAYMENT_CONFIRMED: &str = "PaymentConfirmed.v1";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymentConfirmed {
    payment_id: String,
    booking_id: String,
    amount: f64,
    currency: String,
}

/// Applies confirmed payments to their bookings.
pub struct PaymentsIntegrationHandler {
    commands: Arc<CommandService<Booking, BookingsDecider>>,
}

impl PaymentsIntegrationHandler {
    /// Build the handler over the bookings command service.
    #[must_use]
    pub fn new(commands: Arc<CommandService<Booking, BookingsDecider>>) -> Self {
        Self { commands }
    }

    async fn record(&self, event: &IntegrationEvent) -> Result<(), HandlerError> {
        let confirmed: PaymentConfirmed =
            serde_json::from_value(event.payload.clone()).map_err(|e| {
                HandlerError::Poison(format!("undecodable {PAYMENT_CONFIRMED} payload: {e}"))
            })?;

        let command = BookingCommand::RecordPayment {
            payment_id: confirmed.payment_id,
            amount: Money {
                amount: confirmed.amount,
                currency: confirmed.currency,
            },
        };
        let metadata =
            EventMetadata::caused_by(event.correlation_id.as_str(), event.causation_id.as_str());

        match self
            .commands
            .execute_with_metadata(&confirmed.booking_id, command, metadata)
            .await
        {
            Ok(committed) => {
                tracing::info!(
                    booking_id = %confirmed.booking_id,
                    causation_id = %event.causation_id,
                    version = %committed.version,
                    "payment applied to booking"
                );
                Ok(())
            }
            // The confirmation can arrive before this context has seen the
            // booking; retrying gives the booking stream time to appear.
            Err(CommandError::StreamNotFound(stream_id)) => Err(HandlerError::Transient(format!(
                "booking stream {stream_id} not found yet"
            ))),
            Err(CommandError::Contention { stream_id, attempts }) => {
                Err(HandlerError::Transient(format!(
                    "stream {stream_id} contended after {attempts} attempts"
                )))
            }
            Err(CommandError::Unavailable(reason)) => Err(HandlerError::Transient(reason)),
            Err(CommandError::Rejected(violation)) => {
                tracing::warn!(
                    booking_id = %confirmed.booking_id,
                    causation_id = %event.causation_id,
                    reason = %violation,
                    "confirmed payment rejected by the booking, dropping"
                );
                Ok(())
            }
        }
    }
}

impl IntegrationHandler for PaymentsIntegrationHandler {
    fn name(&self) -> &'static str {
        "payments-integration"
    }

    fn handle<'a>(
        &'a self,
        event: &'a IntegrationEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + 'a>> {
        Box::pin(async move {
            if event.event_type != PAYMENT_CONFIRMED {
                tracing::debug!(event_type = %event.event_type, "ignoring unknown integration event");
                return Ok(());
            }
            self.record(event).await
        })
    }
}
