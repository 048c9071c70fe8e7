//! The command service: one `Load → Decide → Append` cycle per command.
//!
//! The service rebuilds the aggregate from its stream, asks the decider what
//! the command means, and appends the resulting events with the exact version
//! the state was folded up to as the precondition. A concurrency conflict
//! means another writer got there first: the service reloads and re-decides
//! against the fresher state, up to a bounded number of attempts.

use roomline_core::aggregate::{Aggregate, AggregateState};
use roomline_core::command::{CommandError, Committed, Decide};
use roomline_core::event::{EventMetadata, NewEvent};
use roomline_core::event_store::{EventStore, EventStoreError};
use roomline_core::stream::StreamId;
use std::marker::PhantomData;
use std::sync::Arc;

/// Default number of decide/append attempts before giving up as contended.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Executes commands against one aggregate type.
///
/// Cheap to clone if wrapped in `Arc`; holds no per-command state. One
/// instance per aggregate type is wired at startup.
pub struct CommandService<A, D>
where
    A: Aggregate,
    D: Decide<A>,
{
    store: Arc<dyn EventStore>,
    decider: D,
    max_attempts: u32,
    _aggregate: PhantomData<fn() -> A>,
}

impl<A, D> CommandService<A, D>
where
    A: Aggregate,
    D: Decide<A>,
{
    /// Create a service with the default conflict-retry bound.
    #[must_use]
    pub fn new(store: Arc<dyn EventStore>, decider: D) -> Self {
        Self {
            store,
            decider,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            _aggregate: PhantomData,
        }
    }

    /// Override the number of decide/append attempts made on concurrency
    /// conflicts before the command fails as [`CommandError::Contention`].
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Execute `command` against the aggregate instance `id`.
    ///
    /// Starts a fresh correlation chain; use
    /// [`CommandService::execute_with_metadata`] when the command was caused
    /// by another event (e.g. an integration message).
    ///
    /// # Errors
    ///
    /// See [`CommandError`]; rule violations surface as
    /// [`CommandError::Rejected`] and are never retried.
    pub async fn execute(&self, id: &str, command: D::Command) -> Result<Committed, CommandError> {
        self.execute_with_metadata(id, command, EventMetadata::root()).await
    }

    /// Execute `command` against `id`, stamping the committed events with
    /// `metadata`.
    ///
    /// # Errors
    ///
    /// See [`CommandError`].
    pub async fn execute_with_metadata(
        &self,
        id: &str,
        command: D::Command,
        metadata: EventMetadata,
    ) -> Result<Committed, CommandError> {
        let stream_id = AggregateState::<A>::stream_id(id);

        for attempt in 1..=self.max_attempts {
            let recorded = self
                .store
                .read_stream(stream_id.clone(), None)
                .await
                .map_err(map_read_error)?;
            let folded = AggregateState::<A>::replay(&recorded)
                .map_err(|err| CommandError::Unavailable(err.to_string()))?;

            let events = self.decider.decide(&folded.state, &command).await?;

            if events.is_empty() {
                // The command was acceptable but changes nothing. Report the
                // position the stream is already at.
                return match (folded.version, recorded.last()) {
                    (Some(version), Some(last)) => Ok(Committed {
                        version,
                        global_position: last.global_position,
                    }),
                    _ => Err(CommandError::StreamNotFound(stream_id)),
                };
            }

            let mut batch = Vec::with_capacity(events.len());
            for event in &events {
                let new_event = NewEvent::from_event(event, metadata.clone())
                    .map_err(|err| CommandError::Unavailable(err.to_string()))?;
                batch.push(new_event);
            }

            match self.append(stream_id.clone(), folded.expected_version(), batch).await {
                Ok(outcome) => {
                    tracing::debug!(
                        stream_id = %stream_id,
                        version = %outcome.last_version,
                        global_position = %outcome.last_global_position,
                        events = events.len(),
                        "command committed"
                    );
                    return Ok(Committed {
                        version: outcome.last_version,
                        global_position: outcome.last_global_position,
                    });
                }
                Err(EventStoreError::ConcurrencyConflict { .. }) => {
                    tracing::debug!(
                        stream_id = %stream_id,
                        attempt,
                        "concurrency conflict, reloading and re-deciding"
                    );
                }
                Err(EventStoreError::StreamNotFound(id)) => {
                    return Err(CommandError::StreamNotFound(id));
                }
                Err(err) => return Err(CommandError::Unavailable(err.to_string())),
            }
        }

        tracing::warn!(
            stream_id = %stream_id,
            attempts = self.max_attempts,
            "command abandoned, stream stayed contended"
        );
        Err(CommandError::Contention {
            stream_id,
            attempts: self.max_attempts,
        })
    }

    /// Run the append on its own task so that a caller dropping the command
    /// future cannot abandon a write the store may already be committing.
    async fn append(
        &self,
        stream_id: StreamId,
        expected: roomline_core::stream::ExpectedVersion,
        batch: Vec<NewEvent>,
    ) -> Result<roomline_core::event_store::AppendOutcome, EventStoreError> {
        let store = Arc::clone(&self.store);
        let handle =
            tokio::spawn(async move { store.append(stream_id, expected, batch).await });
        handle
            .await
            .map_err(|err| EventStoreError::Unavailable(format!("append task failed: {err}")))?
    }
}

fn map_read_error(err: EventStoreError) -> CommandError {
    match err {
        EventStoreError::StreamNotFound(id) => CommandError::StreamNotFound(id),
        other => CommandError::Unavailable(other.to_string()),
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use roomline_core::command::DomainRuleViolation;
    use roomline_core::event::Event;
    use roomline_core::stream::{ExpectedVersion, Version};
    use roomline_testing::InMemoryEventStore;
    use serde::{Deserialize, Serialize};
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Clone, Debug, Serialize, Deserialize)]
    enum TallyEvent {
        Added(u32),
    }

    impl Event for TallyEvent {
        fn event_type(&self) -> &'static str {
            "TallyAdded.v1"
        }
    }

    #[derive(Default)]
    struct Tally {
        total: u32,
    }

    impl Aggregate for Tally {
        type Event = TallyEvent;

        fn aggregate_type() -> &'static str {
            "Tally"
        }

        fn apply(&mut self, event: &Self::Event) {
            let TallyEvent::Added(by) = event;
            self.total += by;
        }
    }

    enum TallyCommand {
        Add(u32),
        AddOnceOnly(u32),
    }

    struct TallyDecider;

    impl Decide<Tally> for TallyDecider {
        type Command = TallyCommand;

        fn decide<'a>(
            &'a self,
            state: &'a Tally,
            command: &'a Self::Command,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<TallyEvent>, DomainRuleViolation>> + Send + 'a>>
        {
            Box::pin(async move {
                match command {
                    TallyCommand::Add(0) => {
                        Err(DomainRuleViolation::new("cannot add zero"))
                    }
                    TallyCommand::Add(by) => Ok(vec![TallyEvent::Added(*by)]),
                    TallyCommand::AddOnceOnly(by) => {
                        if state.total > 0 {
                            Ok(vec![])
                        } else {
                            Ok(vec![TallyEvent::Added(*by)])
                        }
                    }
                }
            })
        }
    }

    #[tokio::test]
    async fn first_command_creates_the_stream() {
        let store = Arc::new(InMemoryEventStore::new());
        let service = CommandService::<Tally, _>::new(store, TallyDecider);

        let committed = service
            .execute("t1", TallyCommand::Add(3))
            .await
            .expect("command should commit");

        assert_eq!(committed.version, Version::ZERO);
    }

    #[tokio::test]
    async fn rejection_surfaces_without_writing() {
        let store = Arc::new(InMemoryEventStore::new());
        let service = CommandService::<Tally, _>::new(Arc::clone(&store) as _, TallyDecider);

        let result = service.execute("t1", TallyCommand::Add(0)).await;

        assert!(matches!(result, Err(CommandError::Rejected(_))));
        let events = store
            .read_stream(AggregateState::<Tally>::stream_id("t1"), None)
            .await
            .expect("read should succeed");
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn idempotent_noop_reports_current_position() {
        let store = Arc::new(InMemoryEventStore::new());
        let service = CommandService::<Tally, _>::new(store, TallyDecider);

        let first = service
            .execute("t1", TallyCommand::AddOnceOnly(5))
            .await
            .expect("first command should commit");
        let second = service
            .execute("t1", TallyCommand::AddOnceOnly(5))
            .await
            .expect("repeat should be a no-op");

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn noop_on_missing_stream_is_not_found() {
        let store = Arc::new(InMemoryEventStore::new());
        let service = CommandService::<Tally, _>::new(Arc::clone(&store) as _, TallyDecider);
        store
            .append(
                AggregateState::<Tally>::stream_id("t1"),
                ExpectedVersion::NoStream,
                vec![
                    NewEvent::from_event(&TallyEvent::Added(1), EventMetadata::root())
                        .expect("encode"),
                ],
            )
            .await
            .expect("seed append");

        // "t2" never booked anything; AddOnceOnly against it decides nothing.
        struct NoopDecider;
        impl Decide<Tally> for NoopDecider {
            type Command = ();

            fn decide<'a>(
                &'a self,
                _state: &'a Tally,
                (): &'a Self::Command,
            ) -> Pin<
                Box<dyn Future<Output = Result<Vec<TallyEvent>, DomainRuleViolation>> + Send + 'a>,
            > {
                Box::pin(async { Ok(vec![]) })
            }
        }

        let service = CommandService::<Tally, _>::new(store, NoopDecider);
        let result = service.execute("t2", ()).await;
        assert!(matches!(result, Err(CommandError::StreamNotFound(_))));
        drop(service);
    }

    /// Decider that sneaks a competing write into the stream before its own
    /// first append, forcing one conflict round.
    struct RacingDecider {
        store: Arc<InMemoryEventStore>,
        races_left: AtomicU32,
    }

    impl Decide<Tally> for RacingDecider {
        type Command = u32;

        fn decide<'a>(
            &'a self,
            state: &'a Tally,
            by: &'a Self::Command,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<TallyEvent>, DomainRuleViolation>> + Send + 'a>>
        {
            Box::pin(async move {
                if self.races_left.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                        n.checked_sub(1)
                    })
                    .is_ok()
                {
                    let expected = if state.total == 0 {
                        ExpectedVersion::NoStream
                    } else {
                        ExpectedVersion::Any
                    };
                    let event = NewEvent::from_event(&TallyEvent::Added(100), EventMetadata::root())
                        .map_err(|err| DomainRuleViolation::new(err.to_string()))?;
                    self.store
                        .append(AggregateState::<Tally>::stream_id("t1"), expected, vec![event])
                        .await
                        .map_err(|err| DomainRuleViolation::new(err.to_string()))?;
                }
                Ok(vec![TallyEvent::Added(*by)])
            })
        }
    }

    #[tokio::test]
    async fn conflict_reloads_and_redecides() {
        let store = Arc::new(InMemoryEventStore::new());
        let decider = RacingDecider {
            store: Arc::clone(&store),
            races_left: AtomicU32::new(1),
        };
        let service = CommandService::<Tally, _>::new(Arc::clone(&store) as _, decider);

        let committed = service
            .execute("t1", 3)
            .await
            .expect("should commit after one conflict round");

        // Competing event at 0, ours at 1.
        assert_eq!(committed.version, Version::new(1));
    }

    #[tokio::test]
    async fn persistent_contention_is_reported() {
        let store = Arc::new(InMemoryEventStore::new());
        let decider = RacingDecider {
            store: Arc::clone(&store),
            races_left: AtomicU32::new(u32::MAX),
        };
        let service =
            CommandService::<Tally, _>::new(Arc::clone(&store) as _, decider).with_max_attempts(3);

        let result = service.execute("t1", 3).await;

        assert!(matches!(
            result,
            Err(CommandError::Contention { attempts: 3, .. })
        ));
    }
}
