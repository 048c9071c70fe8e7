//! In-memory event store with the full append/read contract.
//!
//! Positions behave exactly like the Postgres store's: stream positions are
//! contiguous from 0, global positions strictly increase in commit order, and
//! the expected-version precondition is checked under the same lock that
//! assigns positions.

use roomline_core::event::{NewEvent, RecordedEvent};
use roomline_core::event_store::{AppendOutcome, EventStore, EventStoreError};
use roomline_core::stream::{ExpectedVersion, GlobalPosition, StreamId, Version};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Log {
    /// The global commit log; index == global position.
    events: Vec<RecordedEvent>,
    /// Per-stream indexes into `events`.
    streams: HashMap<StreamId, Vec<usize>>,
}

/// In-memory [`EventStore`] for tests.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    log: Arc<RwLock<Log>>,
}

impl InMemoryEventStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events in the global log.
    pub async fn len(&self) -> usize {
        self.log.read().await.events.len()
    }

    /// Whether the global log is empty.
    pub async fn is_empty(&self) -> bool {
        self.log.read().await.events.is_empty()
    }
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        stream_id: StreamId,
        expected: ExpectedVersion,
        events: Vec<NewEvent>,
    ) -> Pin<Box<dyn Future<Output = Result<AppendOutcome, EventStoreError>> + Send + '_>> {
        Box::pin(async move {
            if events.is_empty() {
                return Err(EventStoreError::Serialization(
                    "empty batches cannot be appended".to_string(),
                ));
            }

            let mut log = self.log.write().await;
            let current = log
                .streams
                .get(&stream_id)
                .and_then(|indexes| indexes.len().checked_sub(1))
                .map(|last| Version::new(last as u64));

            match (expected, current) {
                (ExpectedVersion::Any, _) => {}
                (ExpectedVersion::NoStream, None) => {}
                (ExpectedVersion::Exact(_), None) => {
                    return Err(EventStoreError::StreamNotFound(stream_id));
                }
                (ExpectedVersion::Exact(version), Some(actual)) if version == actual => {}
                (expected, actual) => {
                    return Err(EventStoreError::ConcurrencyConflict {
                        stream_id,
                        expected,
                        actual,
                    });
                }
            }

            let mut next = current.map_or(0, |version| version.value() + 1);
            let mut outcome = AppendOutcome {
                last_version: Version::new(next),
                last_global_position: GlobalPosition::new(log.events.len() as u64),
            };
            for event in events {
                let global = log.events.len();
                let recorded = RecordedEvent {
                    stream_id: stream_id.clone(),
                    stream_position: Version::new(next),
                    global_position: GlobalPosition::new(global as u64),
                    event_type: event.event_type,
                    data: event.data,
                    metadata: event.metadata,
                };
                outcome = AppendOutcome {
                    last_version: recorded.stream_position,
                    last_global_position: recorded.global_position,
                };
                log.events.push(recorded);
                log.streams.entry(stream_id.clone()).or_default().push(global);
                next += 1;
            }
            Ok(outcome)
        })
    }

    fn read_stream(
        &self,
        stream_id: StreamId,
        from: Option<Version>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<RecordedEvent>, EventStoreError>> + Send + '_>>
    {
        Box::pin(async move {
            let log = self.log.read().await;
            let Some(indexes) = log.streams.get(&stream_id) else {
                return Ok(Vec::new());
            };
            let skip = from.map_or(0, |version| version.value() as usize);
            Ok(indexes
                .iter()
                .skip(skip)
                .map(|&index| log.events[index].clone())
                .collect())
        })
    }

    fn read_all(
        &self,
        after: Option<GlobalPosition>,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<RecordedEvent>, EventStoreError>> + Send + '_>>
    {
        Box::pin(async move {
            let log = self.log.read().await;
            let start = after.map_or(0, |position| position.value() as usize + 1);
            Ok(log.events.iter().skip(start).take(limit).cloned().collect())
        })
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use roomline_core::event::{Event, EventMetadata};
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Debug, Serialize, Deserialize)]
    struct Noted(String);

    impl Event for Noted {
        fn event_type(&self) -> &'static str {
            "Noted.v1"
        }
    }

    fn new_event(text: &str) -> NewEvent {
        NewEvent::from_event(&Noted(text.to_string()), EventMetadata::root()).expect("encode")
    }

    #[tokio::test]
    async fn no_stream_precondition_creates_and_then_conflicts() {
        let store = InMemoryEventStore::new();
        let stream = StreamId::new("Booking-B1");

        let outcome = store
            .append(stream.clone(), ExpectedVersion::NoStream, vec![new_event("a")])
            .await
            .expect("first append");
        assert_eq!(outcome.last_version, Version::ZERO);

        let second = store
            .append(stream.clone(), ExpectedVersion::NoStream, vec![new_event("b")])
            .await;
        assert!(matches!(
            second,
            Err(EventStoreError::ConcurrencyConflict {
                actual: Some(actual),
                ..
            }) if actual == Version::ZERO
        ));
    }

    #[tokio::test]
    async fn append_reports_the_position_of_the_last_committed_event() {
        let store = InMemoryEventStore::new();
        let stream = StreamId::new("Booking-B1");

        let outcome = store
            .append(
                stream.clone(),
                ExpectedVersion::NoStream,
                vec![new_event("a"), new_event("b")],
            )
            .await
            .expect("append");

        // The reported version is the stream's tip, usable as the next
        // Exact precondition.
        assert_eq!(outcome.last_version, Version::new(1));
        let outcome = store
            .append(
                stream,
                ExpectedVersion::Exact(outcome.last_version),
                vec![new_event("c")],
            )
            .await
            .expect("append at tip");
        assert_eq!(outcome.last_version, Version::new(2));
    }

    #[tokio::test]
    async fn exact_against_missing_stream_is_not_found() {
        let store = InMemoryEventStore::new();
        let result = store
            .append(
                StreamId::new("Booking-missing"),
                ExpectedVersion::Exact(Version::ZERO),
                vec![new_event("a")],
            )
            .await;
        assert!(matches!(result, Err(EventStoreError::StreamNotFound(_))));
    }

    #[tokio::test]
    async fn read_all_pages_in_commit_order() {
        let store = InMemoryEventStore::new();
        for (stream, text) in [("Booking-B1", "a"), ("Payment-P1", "b"), ("Booking-B1", "c")] {
            store
                .append(StreamId::new(stream), ExpectedVersion::Any, vec![new_event(text)])
                .await
                .expect("append");
        }

        let first = store.read_all(None, 2).await.expect("read");
        assert_eq!(first.len(), 2);
        let rest = store
            .read_all(Some(first[1].global_position), 10)
            .await
            .expect("read");
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].stream_id, StreamId::new("Booking-B1"));
        assert_eq!(rest[0].stream_position, Version::new(1));
    }

    proptest! {
        #[test]
        fn interleaved_appends_keep_stream_positions_contiguous(
            writes in prop::collection::vec((0..4u8, ".{0,12}"), 1..40)
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .build()
                .expect("runtime");
            runtime.block_on(async move {
                let store = InMemoryEventStore::new();
                for (stream, text) in &writes {
                    store
                        .append(
                            StreamId::for_aggregate("Booking", &stream.to_string()),
                            ExpectedVersion::Any,
                            vec![new_event(text)],
                        )
                        .await
                        .expect("append");
                }

                let all = store.read_all(None, usize::MAX).await.expect("read");
                prop_assert_eq!(all.len(), writes.len());
                for stream in 0..4u8 {
                    let id = StreamId::for_aggregate("Booking", &stream.to_string());
                    let events = store.read_stream(id, None).await.expect("read");
                    for (position, event) in events.iter().enumerate() {
                        prop_assert_eq!(event.stream_position, Version::new(position as u64));
                    }
                }
                for pair in all.windows(2) {
                    prop_assert!(pair[0].global_position < pair[1].global_position);
                }
                Ok(())
            })?;
        }
    }
}
