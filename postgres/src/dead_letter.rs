//! PostgreSQL dead-letter sink.
//!
//! Parked events keep their full payload and metadata so an operator can
//! inspect, fix and replay them by hand; the row is the audit trail for why
//! a subscription moved past an event without applying it.

use roomline_core::event::RecordedEvent;
use roomline_core::handler::{DeadLetterError, DeadLetterSink};
use sqlx::PgPool;
use std::future::Future;
use std::pin::Pin;

/// PostgreSQL-backed [`DeadLetterSink`] writing to the `dead_letters` table.
#[derive(Clone)]
pub struct PostgresDeadLetterSink {
    pool: PgPool,
}

impl PostgresDeadLetterSink {
    /// Create a sink using an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl DeadLetterSink for PostgresDeadLetterSink {
    fn record<'a>(
        &'a self,
        handler: &'a str,
        event: &'a RecordedEvent,
        reason: &'a str,
        attempts: u32,
    ) -> Pin<Box<dyn Future<Output = Result<(), DeadLetterError>> + Send + 'a>> {
        Box::pin(async move {
            let metadata = serde_json::to_value(&event.metadata)
                .map_err(|e| DeadLetterError(e.to_string()))?;
            sqlx::query(
                "INSERT INTO dead_letters
                    (handler, stream_id, stream_position, global_position,
                     event_type, data, metadata, reason, attempts, parked_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now())",
            )
            .bind(handler)
            .bind(event.stream_id.as_str())
            .bind(event.stream_position.value() as i64)
            .bind(event.global_position.value() as i64)
            .bind(&event.event_type)
            .bind(&event.data)
            .bind(metadata)
            .bind(reason)
            .bind(attempts as i32)
            .execute(&self.pool)
            .await
            .map_err(|e| DeadLetterError(e.to_string()))?;
            tracing::warn!(
                handler,
                stream_id = %event.stream_id,
                global_position = %event.global_position,
                attempts,
                "event parked in dead_letters"
            );
            Ok(())
        })
    }
}
