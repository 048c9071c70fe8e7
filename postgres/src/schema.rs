//! Schema provisioning for the Postgres-backed stores.
//!
//! Production deployments usually own their migrations; this module exists
//! for local development and test environments where the service provisions
//! its own tables on startup.

use sqlx::PgPool;

const DDL: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS events (
        global_position BIGSERIAL PRIMARY KEY,
        stream_id TEXT NOT NULL,
        stream_position BIGINT NOT NULL,
        event_type TEXT NOT NULL,
        data BYTEA NOT NULL,
        metadata JSONB NOT NULL,
        recorded_at TIMESTAMPTZ NOT NULL,
        UNIQUE (stream_id, stream_position)
    )",
    "CREATE TABLE IF NOT EXISTS checkpoints (
        subscription_id TEXT PRIMARY KEY,
        global_position BIGINT NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS read_models (
        key TEXT PRIMARY KEY,
        data BYTEA NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS dead_letters (
        id BIGSERIAL PRIMARY KEY,
        handler TEXT NOT NULL,
        stream_id TEXT NOT NULL,
        stream_position BIGINT NOT NULL,
        global_position BIGINT NOT NULL,
        event_type TEXT NOT NULL,
        data BYTEA NOT NULL,
        metadata JSONB NOT NULL,
        reason TEXT NOT NULL,
        attempts INT NOT NULL,
        parked_at TIMESTAMPTZ NOT NULL
    )",
];

/// Create every table the stores in this crate expect, if missing.
///
/// # Errors
///
/// Returns the underlying [`sqlx::Error`] when a statement fails.
pub async fn create_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    for statement in DDL {
        sqlx::query(statement).execute(pool).await?;
    }
    tracing::info!("database schema ensured");
    Ok(())
}
