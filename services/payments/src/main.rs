//! Payments service entry point: wires the event store, the gateway
//! subscription and the broker, then runs until interrupted.

use payments::PaymentsGateway;
use payments::config::Config;
use roomline_postgres::{
    PostgresCheckpointStore, PostgresDeadLetterSink, PostgresEventStore, create_schema,
};
use roomline_redpanda::RedpandaEventBus;
use roomline_subscriptions::{IntegrationGateway, subscription};
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
    let bus = Arc::new(RedpandaEventBus::new(&config.kafka_brokers)?);

    let gateway = IntegrationGateway::new(
        "payments-gateway",
        Arc::new(PaymentsGateway),
        bus,
        config.integration_topic.clone(),
    );
    let gateway_subscription = subscription("payments-gateway", store, checkpoints)
        .handler(Arc::new(gateway))
        .partition_count(config.partition_count)
        .poll_interval(config.poll_interval)
        .dead_letter(dead_letters)
        .start()
        .await?;
    tracing::info!(topic = %config.integration_topic, "payments service running");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    gateway_subscription.shutdown().await;
    Ok(())
}
