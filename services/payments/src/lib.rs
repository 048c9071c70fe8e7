//! # payments
//!
//! The Payments bounded context. Payments are processed as an event-sourced
//! [`domain::Payment`] aggregate; captured payments cross the boundary as
//! `PaymentConfirmed.v1` integration events via [`gateway::PaymentsGateway`],
//! published by a checkpointed catch-up subscription.
//!
//! Command submission (the HTTP surface in a full deployment) is external to
//! this crate: callers construct a `CommandService<Payment, PaymentsDecider>`
//! and execute [`application::PaymentCommand`]s against it.

pub mod application;
pub mod config;
pub mod domain;
pub mod gateway;

pub use application::{PaymentCommand, PaymentsDecider};
pub use domain::{Payment, PaymentEvent, PaymentStatus};
pub use gateway::{PAYMENT_CONFIRMED, PaymentsGateway};
