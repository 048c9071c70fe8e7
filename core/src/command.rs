//! Command handling contracts: deciders, outcomes and the caller-facing
//! error taxonomy.
//!
//! The command service (in `roomline-runtime`) drives the
//! `Load → Decide → Append` cycle; this module defines the pieces the
//! services implement and the small, stable set of outcomes callers see.

use crate::aggregate::Aggregate;
use crate::stream::{GlobalPosition, StreamId, Version};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// A business-rule failure. Permanent: never retried, surfaced to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("domain rule violated: {0}")]
pub struct DomainRuleViolation(pub String);

impl DomainRuleViolation {
    /// Build a violation from anything displayable.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Decision logic for one aggregate type.
///
/// Given the current state and a command, produce the events that record the
/// decision, or reject it. Deciders may consult injected capability ports
/// (availability checks, currency conversion), which is why `decide` is
/// async, but they must not write anywhere: the only effect of a decision
/// is the returned events.
///
/// Returning an empty vector is a valid, idempotent outcome: the command was
/// acceptable but changes nothing (e.g. a payment that was already recorded).
pub trait Decide<A: Aggregate>: Send + Sync {
    /// The command type this decider accepts.
    type Command: Send + Sync;

    /// Decide what the command means given the current state.
    fn decide<'a>(
        &'a self,
        state: &'a A,
        command: &'a Self::Command,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<A::Event>, DomainRuleViolation>> + Send + 'a>>;
}

/// Successful command outcome: the effects are durably committed and will be
/// visible to every subscription reading the global log.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Committed {
    /// New stream version after the append.
    pub version: Version,
    /// Global position of the last committed event.
    pub global_position: GlobalPosition,
}

/// Caller-facing command failures.
///
/// Concurrency conflicts are retried inside the command service and only
/// escalate as [`CommandError::Contention`] once the bound is exhausted.
#[derive(Error, Debug)]
pub enum CommandError {
    /// The command violates a business rule. Not retried.
    #[error(transparent)]
    Rejected(#[from] DomainRuleViolation),

    /// Optimistic-concurrency retries were exhausted.
    #[error("stream {stream_id} still contended after {attempts} attempts")]
    Contention {
        /// Stream that kept conflicting.
        stream_id: StreamId,
        /// Number of decide/append attempts made.
        attempts: u32,
    },

    /// The command addressed a stream that must exist but does not.
    #[error("stream not found: {0}")]
    StreamNotFound(StreamId),

    /// Store or serialization failure while executing the command.
    #[error("command could not be executed: {0}")]
    Unavailable(String),
}
