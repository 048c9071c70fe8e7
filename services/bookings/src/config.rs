//! Environment-driven configuration.

use std::env;
use std::time::Duration;
use thiserror::Error;

/// A required environment variable is missing or malformed.
#[derive(Error, Debug)]
#[error("configuration error: {0}")]
pub struct ConfigError(String);

/// Runtime configuration for the bookings service.
#[derive(Clone, Debug)]
pub struct Config {
    /// Postgres connection string.
    pub database_url: String,
    /// Kafka/Redpanda bootstrap servers.
    pub kafka_brokers: String,
    /// Topic the payments confirmations arrive on.
    pub integration_topic: String,
    /// Consumer group for the payments consumer.
    pub consumer_group: String,
    /// Lanes for the projections subscription.
    pub partition_count: usize,
    /// Idle poll interval for the subscription.
    pub poll_interval: Duration,
    /// Whether to create tables on startup (local development).
    pub provision_schema: bool,
}

impl Config {
    /// Read configuration from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when `DATABASE_URL` is missing or a numeric
    /// variable does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| ConfigError("DATABASE_URL must be set".to_string()))?;
        let kafka_brokers =
            env::var("KAFKA_BROKERS").unwrap_or_else(|_| "localhost:9092".to_string());
        let integration_topic =
            env::var("INTEGRATION_TOPIC").unwrap_or_else(|_| "payments-integration".to_string());
        let consumer_group =
            env::var("CONSUMER_GROUP").unwrap_or_else(|_| "bookings-payments".to_string());
        let partition_count = read_parsed("SUBSCRIPTION_PARTITIONS", 2)?;
        let poll_interval = Duration::from_millis(read_parsed("POLL_INTERVAL_MS", 100)?);
        let provision_schema = env::var("PROVISION_SCHEMA").is_ok_and(|v| v == "1" || v == "true");

        Ok(Self {
            database_url,
            kafka_brokers,
            integration_topic,
            consumer_group,
            partition_count,
            poll_interval,
            provision_schema,
        })
    }
}

fn read_parsed<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ConfigError(format!("{name} must be a number, got '{raw}'"))),
        Err(_) => Ok(default),
    }
}
