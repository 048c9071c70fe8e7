//! End-to-end tests for the catch-up subscription engine against the
//! in-memory stores.

#![allow(clippy::expect_used, clippy::panic)]

use roomline_core::event::{Event, EventMetadata, NewEvent};
use roomline_core::event_store::EventStore;
use roomline_core::stream::{ExpectedVersion, GlobalPosition, StreamId};
use roomline_subscriptions::subscription;
use roomline_testing::{
    InMemoryCheckpointStore, InMemoryEventStore, RecordingDeadLetterSink, RecordingHandler,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Noted {
    note: String,
}

impl Event for Noted {
    fn event_type(&self) -> &'static str {
        "Noted.v1"
    }
}

async fn seed(store: &InMemoryEventStore, stream: &str, note: &str) -> GlobalPosition {
    let event = NewEvent::from_event(
        &Noted {
            note: note.to_string(),
        },
        EventMetadata::root(),
    )
    .expect("encode");
    store
        .append(StreamId::new(stream), ExpectedVersion::Any, vec![event])
        .await
        .expect("append")
        .last_global_position
}

async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..500 {
        if check().await {
            return;
        }
        sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for: {what}");
}

fn fast() -> roomline_runtime::retry::RetryPolicy {
    roomline_runtime::retry::RetryPolicy::builder()
        .initial_delay(Duration::from_millis(5))
        .max_delay(Duration::from_millis(20))
        .build()
}

#[tokio::test]
async fn replays_history_then_tails_new_commits() {
    let store = Arc::new(InMemoryEventStore::new());
    let checkpoints = Arc::new(InMemoryCheckpointStore::new());
    let handler = RecordingHandler::new("recorder");

    seed(&store, "Booking-B1", "before").await;
    let engine = subscription("bookings", Arc::clone(&store) as _, Arc::clone(&checkpoints) as _)
        .handler(Arc::new(handler.clone()))
        .poll_interval(Duration::from_millis(5))
        .start()
        .await
        .expect("start");

    let last = seed(&store, "Booking-B1", "after").await;
    eventually("both events delivered", || async { handler.seen().await.len() == 2 }).await;

    engine.shutdown().await;
    assert_eq!(checkpoints.position("bookings").await, Some(last));
}

#[tokio::test]
async fn per_stream_order_is_preserved_across_two_lanes() {
    let store = Arc::new(InMemoryEventStore::new());
    let checkpoints = Arc::new(InMemoryCheckpointStore::new());
    let handler = RecordingHandler::new("recorder");

    // Interleave three streams in the global log.
    for round in 0..5 {
        for stream in ["Booking-B1", "Booking-B2", "Booking-B3"] {
            seed(&store, stream, &format!("round-{round}")).await;
        }
    }

    let engine = subscription("bookings", Arc::clone(&store) as _, checkpoints as _)
        .handler(Arc::new(handler.clone()))
        .partition_count(2)
        .poll_interval(Duration::from_millis(5))
        .start()
        .await
        .expect("start");

    eventually("all 15 events delivered", || async { handler.seen().await.len() == 15 }).await;
    engine.shutdown().await;

    let seen = handler.seen().await;
    for stream in ["Booking-B1", "Booking-B2", "Booking-B3"] {
        let positions: Vec<_> = seen
            .iter()
            .filter(|event| event.stream_id.as_str() == stream)
            .map(|event| event.global_position)
            .collect();
        assert_eq!(positions.len(), 5, "{stream} should see all its events");
        assert!(
            positions.windows(2).all(|pair| pair[0] < pair[1]),
            "{stream} must be delivered in log order"
        );
    }
}

#[tokio::test]
async fn transient_failures_retry_without_losing_the_event() {
    let store = Arc::new(InMemoryEventStore::new());
    let checkpoints = Arc::new(InMemoryCheckpointStore::new());
    let handler = RecordingHandler::new("flaky").failing_transiently(2);

    let last = seed(&store, "Booking-B1", "only").await;
    let engine = subscription("bookings", Arc::clone(&store) as _, Arc::clone(&checkpoints) as _)
        .handler(Arc::new(handler.clone()))
        .retry_policy(fast())
        .poll_interval(Duration::from_millis(5))
        .start()
        .await
        .expect("start");

    eventually("event delivered after retries", || async {
        handler.seen().await.len() == 1
    })
    .await;
    engine.shutdown().await;
    assert_eq!(checkpoints.position("bookings").await, Some(last));
}

#[tokio::test]
async fn poison_events_are_parked_and_the_lane_moves_on() {
    let store = Arc::new(InMemoryEventStore::new());
    let checkpoints = Arc::new(InMemoryCheckpointStore::new());
    let sink = RecordingDeadLetterSink::new();
    let handler = RecordingHandler::new("picky").poisoned_by("Noted.v1").await;
    let healthy = RecordingHandler::new("healthy");

    let last = seed(&store, "Booking-B1", "poisoned").await;
    let engine = subscription("bookings", Arc::clone(&store) as _, Arc::clone(&checkpoints) as _)
        .handler(Arc::new(handler))
        .handler(Arc::new(healthy.clone()))
        .retry_policy(fast())
        .dead_letter(Arc::new(sink.clone()))
        .poll_interval(Duration::from_millis(5))
        .start()
        .await
        .expect("start");

    eventually("healthy handler still sees the event", || async {
        healthy.seen().await.len() == 1
    })
    .await;
    eventually("poison parked", || async { sink.letters().await.len() == 1 }).await;
    engine.shutdown().await;

    let letters = sink.letters().await;
    assert_eq!(letters[0].handler, "picky");
    assert_eq!(checkpoints.position("bookings").await, Some(last));
}

#[tokio::test]
async fn without_a_sink_the_checkpoint_never_passes_a_stuck_event() {
    let store = Arc::new(InMemoryEventStore::new());
    let checkpoints = Arc::new(InMemoryCheckpointStore::new());
    let handler = RecordingHandler::new("stuck").poisoned_by("Noted.v1").await;

    seed(&store, "Booking-B1", "stuck").await;
    let engine = subscription("bookings", Arc::clone(&store) as _, Arc::clone(&checkpoints) as _)
        .handler(Arc::new(handler))
        .retry_policy(fast())
        .max_handler_attempts(2)
        .poll_interval(Duration::from_millis(5))
        .checkpoint_interval(Duration::from_millis(10))
        .start()
        .await
        .expect("start");

    sleep(Duration::from_millis(150)).await;
    engine.shutdown().await;
    assert_eq!(checkpoints.position("bookings").await, None);
}

#[tokio::test]
async fn restart_resumes_from_the_saved_checkpoint() {
    let store = Arc::new(InMemoryEventStore::new());
    let checkpoints = Arc::new(InMemoryCheckpointStore::new());

    let first_run = RecordingHandler::new("first");
    seed(&store, "Booking-B1", "one").await;
    seed(&store, "Booking-B2", "two").await;

    let engine = subscription("bookings", Arc::clone(&store) as _, Arc::clone(&checkpoints) as _)
        .handler(Arc::new(first_run.clone()))
        .poll_interval(Duration::from_millis(5))
        .start()
        .await
        .expect("start");
    eventually("first run catches up", || async { first_run.seen().await.len() == 2 }).await;
    engine.shutdown().await;

    seed(&store, "Booking-B1", "three").await;
    let second_run = RecordingHandler::new("second");
    let engine = subscription("bookings", Arc::clone(&store) as _, Arc::clone(&checkpoints) as _)
        .handler(Arc::new(second_run.clone()))
        .poll_interval(Duration::from_millis(5))
        .start()
        .await
        .expect("restart");
    eventually("second run sees only the new event", || async {
        second_run.seen().await.len() == 1
    })
    .await;
    engine.shutdown().await;

    let seen = second_run.seen().await;
    assert_eq!(seen[0].stream_id, StreamId::new("Booking-B1"));
}
