//! Bookings service entry point: wires the event store, the projection
//! subscription and the payments consumer, then runs until interrupted.

use bookings::config::Config;
use bookings::{
    AlwaysAvailable, Booking, BookingStateProjection, BookingsDecider, IdentityConverter,
    MyBookingsProjection, PaymentsIntegrationHandler,
};
use roomline_postgres::{
    PostgresCheckpointStore, PostgresDeadLetterSink, PostgresEventStore, PostgresReadModelStore,
    create_schema,
};
use roomline_redpanda::RedpandaEventBus;
use roomline_runtime::service::CommandService;
use roomline_subscriptions::{IntegrationConsumer, subscription};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;
    let store = Arc::new(PostgresEventStore::connect(&config.database_url).await?);
    if config.provision_schema {
        create_schema(store.pool()).await?;
    }
    let checkpoints = Arc::new(PostgresCheckpointStore::new(store.pool().clone()));
    let dead_letters = Arc::new(PostgresDeadLetterSink::new(store.pool().clone()));
    let read_models = Arc::new(PostgresReadModelStore::new(
        store.pool().clone(),
        "read_models".to_string(),
    ));
    let bus = Arc::new(RedpandaEventBus::new(&config.kafka_brokers)?);

    let projections = subscription(
        "bookings-projections",
        Arc::clone(&store) as _,
        checkpoints,
    )
    .handler(Arc::new(BookingStateProjection::new(
        Arc::clone(&read_models) as _,
    )))
    .handler(Arc::new(MyBookingsProjection::new(read_models as _)))
    .partition_count(config.partition_count)
    .poll_interval(config.poll_interval)
    .dead_letter(dead_letters)
    .start()
    .await?;

    let decider = BookingsDecider::new(Arc::new(AlwaysAvailable), Arc::new(IdentityConverter));
    let commands = Arc::new(CommandService::<Booking, _>::new(store as _, decider));
    let consumer = IntegrationConsumer::new(
        bus,
        config.integration_topic.clone(),
        config.consumer_group.clone(),
        Arc::new(PaymentsIntegrationHandler::new(commands)),
    )
    .start()
    .await?;
    tracing::info!(topic = %config.integration_topic, "bookings service running");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    consumer.shutdown().await;
    projections.shutdown().await;
    Ok(())
}
