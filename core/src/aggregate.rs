//! Aggregates: in-memory projections of a single stream.
//!
//! An aggregate is rebuilt on every command by folding its stream's events
//! in order. It lives for the duration of one command invocation; the only
//! state that outlasts it is the stream itself.

use crate::event::{EventError, RecordedEvent};
use crate::stream::{ExpectedVersion, StreamId, Version};

/// State folded from one event stream.
///
/// `apply` must be total and deterministic: replaying the same events in the
/// same order always yields the same state. Decisions (command handling) live
/// in [`crate::command::Decide`], not here, so replay never re-runs them.
pub trait Aggregate: Default + Send + Sync + 'static {
    /// The closed event enum for this aggregate.
    type Event: crate::event::Event;

    /// Stream-name prefix, e.g. `"Booking"`.
    fn aggregate_type() -> &'static str;

    /// Fold one event into the state.
    fn apply(&mut self, event: &Self::Event);
}

/// An aggregate plus the stream version it was folded up to.
///
/// `version` is `None` for an aggregate whose stream does not exist yet; the
/// matching append precondition is then [`ExpectedVersion::NoStream`].
#[derive(Clone, Debug)]
pub struct AggregateState<A: Aggregate> {
    /// The folded state.
    pub state: A,
    /// Stream position of the last applied event, `None` before the first.
    pub version: Option<Version>,
}

impl<A: Aggregate> Default for AggregateState<A> {
    fn default() -> Self {
        Self {
            state: A::default(),
            version: None,
        }
    }
}

impl<A: Aggregate> AggregateState<A> {
    /// Stream id for this aggregate instance.
    #[must_use]
    pub fn stream_id(id: &str) -> StreamId {
        StreamId::for_aggregate(A::aggregate_type(), id)
    }

    /// Rebuild state by folding recorded events in order.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Deserialization`] when a stored payload does not
    /// decode as `A::Event`.
    pub fn replay(events: &[RecordedEvent]) -> Result<Self, EventError> {
        let mut folded = Self::default();
        for recorded in events {
            let event = recorded.decode::<A::Event>()?;
            folded.state.apply(&event);
            folded.version = Some(recorded.stream_position);
        }
        Ok(folded)
    }

    /// Append precondition matching the version this state was folded up to.
    #[must_use]
    pub fn expected_version(&self) -> ExpectedVersion {
        self.version.map_or(ExpectedVersion::NoStream, ExpectedVersion::Exact)
    }
}
