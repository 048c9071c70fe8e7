//! Projections running on a live catch-up subscription.

#![allow(clippy::expect_used, clippy::panic)]

use bookings::{
    AlwaysAvailable, Booking, BookingCommand, BookingStateProjection, BookingsDecider,
    IdentityConverter, Money, MyBookingsProjection, StayPeriod,
};
use chrono::NaiveDate;
use roomline_core::read_model::ReadModelStore;
use roomline_runtime::service::CommandService;
use roomline_subscriptions::subscription;
use roomline_testing::{InMemoryCheckpointStore, InMemoryEventStore, InMemoryReadModelStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

fn service(store: Arc<InMemoryEventStore>) -> CommandService<Booking, BookingsDecider> {
    let decider = BookingsDecider::new(Arc::new(AlwaysAvailable), Arc::new(IdentityConverter));
    CommandService::new(store as _, decider)
}

fn book(guest_id: &str, room_id: &str) -> BookingCommand {
    BookingCommand::BookRoom {
        guest_id: guest_id.to_string(),
        room_id: room_id.to_string(),
        period: StayPeriod {
            check_in: NaiveDate::from_ymd_opt(2026, 3, 1).expect("date"),
            check_out: NaiveDate::from_ymd_opt(2026, 3, 4).expect("date"),
        },
        price: Money {
            amount: 300.0,
            currency: "EUR".to_string(),
        },
    }
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

async fn row(store: &InMemoryReadModelStore, key: &str) -> Option<serde_json::Value> {
    let bytes = store.get(key).await.expect("get")?;
    Some(serde_json::from_slice(&bytes).expect("decode row"))
}

fn projection_subscription(
    store: &Arc<InMemoryEventStore>,
    checkpoints: &Arc<InMemoryCheckpointStore>,
    read_models: &Arc<InMemoryReadModelStore>,
) -> roomline_subscriptions::SubscriptionBuilder {
    subscription(
        "bookings-projections",
        Arc::clone(store) as _,
        Arc::clone(checkpoints) as _,
    )
    .handler(Arc::new(BookingStateProjection::new(
        Arc::clone(read_models) as _,
    )))
    .handler(Arc::new(MyBookingsProjection::new(
        Arc::clone(read_models) as _,
    )))
    .partition_count(2)
    .poll_interval(Duration::from_millis(5))
}

#[tokio::test]
async fn the_booking_lifecycle_updates_both_read_models() {
    let store = Arc::new(InMemoryEventStore::new());
    let checkpoints = Arc::new(InMemoryCheckpointStore::new());
    let read_models = Arc::new(InMemoryReadModelStore::new());
    let engine = projection_subscription(&store, &checkpoints, &read_models)
        .start()
        .await
        .expect("start");

    let service = service(Arc::clone(&store));
    service.execute("B1", book("G1", "R12")).await.expect("book B1");
    service.execute("B2", book("G1", "R20")).await.expect("book B2");
    service
        .execute(
            "B1",
            BookingCommand::RecordPayment {
                payment_id: "P1".to_string(),
                amount: Money {
                    amount: 300.0,
                    currency: "EUR".to_string(),
                },
            },
        )
        .await
        .expect("pay B1");
    service
        .execute(
            "B2",
            BookingCommand::CancelBooking {
                reason: "plans changed".to_string(),
            },
        )
        .await
        .expect("cancel B2");

    eventually("B1 row reaches fully-paid", || async {
        row(&read_models, &BookingStateProjection::key("B1"))
            .await
            .is_some_and(|r| r["status"] == "fully-paid")
    })
    .await;
    eventually("G1's list drops the cancelled booking", || async {
        row(&read_models, &MyBookingsProjection::key("G1"))
            .await
            .is_some_and(|r| r["bookings"] == serde_json::json!(["B1"]))
    })
    .await;

    let b2 = row(&read_models, &BookingStateProjection::key("B2"))
        .await
        .expect("B2 row");
    assert_eq!(b2["status"], "cancelled");

    engine.shutdown().await;
}

#[tokio::test]
async fn replaying_from_scratch_leaves_the_rows_unchanged() {
    let store = Arc::new(InMemoryEventStore::new());
    let checkpoints = Arc::new(InMemoryCheckpointStore::new());
    let read_models = Arc::new(InMemoryReadModelStore::new());

    let service = service(Arc::clone(&store));
    service.execute("B1", book("G1", "R12")).await.expect("book");
    service
        .execute(
            "B1",
            BookingCommand::RecordPayment {
                payment_id: "P1".to_string(),
                amount: Money {
                    amount: 120.0,
                    currency: "EUR".to_string(),
                },
            },
        )
        .await
        .expect("pay");

    let engine = projection_subscription(&store, &checkpoints, &read_models)
        .start()
        .await
        .expect("first run");
    eventually("row appears", || async {
        row(&read_models, &BookingStateProjection::key("B1")).await.is_some()
    })
    .await;
    engine.shutdown().await;
    let before = row(&read_models, &BookingStateProjection::key("B1"))
        .await
        .expect("row");

    // Fresh checkpoints: the whole log is delivered again against the same
    // read-model rows.
    let engine = projection_subscription(&store, &Arc::new(InMemoryCheckpointStore::new()), &read_models)
        .start()
        .await
        .expect("second run");
    sleep(Duration::from_millis(50)).await;
    engine.shutdown().await;

    let after = row(&read_models, &BookingStateProjection::key("B1"))
        .await
        .expect("row survives replay");
    assert_eq!(before, after);
}
