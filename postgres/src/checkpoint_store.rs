//! PostgreSQL checkpoint store.

use roomline_core::checkpoint::{CheckpointError, CheckpointStore};
use roomline_core::stream::GlobalPosition;
use sqlx::PgPool;
use std::future::Future;
use std::pin::Pin;

/// PostgreSQL-backed [`CheckpointStore`].
///
/// One row per subscription in the `checkpoints` table. The upsert uses
/// `GREATEST` so a position can never regress even if an out-of-date engine
/// instance writes after a newer one.
#[derive(Clone)]
pub struct PostgresCheckpointStore {
    pool: PgPool,
}

impl PostgresCheckpointStore {
    /// Create a store using an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl CheckpointStore for PostgresCheckpointStore {
    fn load<'a>(
        &'a self,
        subscription_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<GlobalPosition>, CheckpointError>> + Send + 'a>>
    {
        Box::pin(async move {
            let position: Option<i64> = sqlx::query_scalar(
                "SELECT global_position FROM checkpoints WHERE subscription_id = $1",
            )
            .bind(subscription_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CheckpointError::Unavailable(e.to_string()))?;
            Ok(position.map(|p| GlobalPosition::new(p as u64)))
        })
    }

    fn save<'a>(
        &'a self,
        subscription_id: &'a str,
        position: GlobalPosition,
    ) -> Pin<Box<dyn Future<Output = Result<(), CheckpointError>> + Send + 'a>> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO checkpoints (subscription_id, global_position, updated_at)
                 VALUES ($1, $2, now())
                 ON CONFLICT (subscription_id) DO UPDATE
                 SET global_position = GREATEST(checkpoints.global_position, EXCLUDED.global_position),
                     updated_at = now()",
            )
            .bind(subscription_id)
            .bind(position.value() as i64)
            .execute(&self.pool)
            .await
            .map_err(|e| CheckpointError::Unavailable(e.to_string()))?;
            Ok(())
        })
    }
}
