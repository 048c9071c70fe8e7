//! PostgreSQL event store.
//!
//! One `events` table holds every stream: `global_position` (a `BIGSERIAL`)
//! is the service-wide commit log, `(stream_id, stream_position)` is unique
//! per stream. Appends run in a transaction that takes a single advisory
//! lock, so commits become visible in global-position order and a log reader
//! can resume from any previously seen position without missing a row that
//! was still uncommitted when it read past it.

use roomline_core::event::{EventMetadata, NewEvent, RecordedEvent};
use roomline_core::event_store::{AppendOutcome, EventStore, EventStoreError};
use roomline_core::stream::{ExpectedVersion, GlobalPosition, StreamId, Version};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::future::Future;
use std::pin::Pin;

/// Advisory lock key for append serialization.
const APPEND_LOCK_KEY: i64 = 0x726f_6f6d_6c6e_6576;

/// PostgreSQL-backed [`EventStore`].
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    /// Create a store using an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to `database_url` with a small dedicated pool.
    ///
    /// # Errors
    ///
    /// Returns [`EventStoreError::Unavailable`] when the connection fails.
    pub async fn connect(database_url: &str) -> Result<Self, EventStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| EventStoreError::Unavailable(format!("failed to connect: {e}")))?;
        Ok(Self::new(pool))
    }

    /// The underlying connection pool, for schema setup or custom queries.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Check the append precondition and return the first position of the batch.
fn next_position(
    expected: ExpectedVersion,
    current: Option<i64>,
    stream_id: &StreamId,
) -> Result<i64, EventStoreError> {
    let conflict = |actual: Option<i64>| EventStoreError::ConcurrencyConflict {
        stream_id: stream_id.clone(),
        expected,
        actual: actual.map(|v| Version::new(v as u64)),
    };
    match (expected, current) {
        (ExpectedVersion::Any, current) => Ok(current.map_or(0, |v| v + 1)),
        (ExpectedVersion::NoStream, None) => Ok(0),
        (ExpectedVersion::NoStream, Some(actual)) => Err(conflict(Some(actual))),
        (ExpectedVersion::Exact(_), None) => {
            Err(EventStoreError::StreamNotFound(stream_id.clone()))
        }
        (ExpectedVersion::Exact(version), Some(actual)) => {
            if version.value() as i64 == actual {
                Ok(actual + 1)
            } else {
                Err(conflict(Some(actual)))
            }
        }
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    stream_id: String,
    stream_position: i64,
    global_position: i64,
    event_type: String,
    data: Vec<u8>,
    metadata: serde_json::Value,
}

impl EventRow {
    fn into_recorded(self) -> Result<RecordedEvent, EventStoreError> {
        let metadata: EventMetadata = serde_json::from_value(self.metadata)
            .map_err(|e| EventStoreError::Serialization(format!("bad metadata: {e}")))?;
        Ok(RecordedEvent {
            stream_id: StreamId::new(self.stream_id),
            stream_position: Version::new(self.stream_position as u64),
            global_position: GlobalPosition::new(self.global_position as u64),
            event_type: self.event_type,
            data: self.data,
            metadata,
        })
    }
}

fn unavailable(e: sqlx::Error) -> EventStoreError {
    EventStoreError::Unavailable(e.to_string())
}

const SELECT_COLUMNS: &str =
    "SELECT stream_id, stream_position, global_position, event_type, data, metadata FROM events";

impl EventStore for PostgresEventStore {
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

            let mut tx = self.pool.begin().await.map_err(unavailable)?;
            sqlx::query("SELECT pg_advisory_xact_lock($1)")
                .bind(APPEND_LOCK_KEY)
                .execute(&mut *tx)
                .await
                .map_err(unavailable)?;

            let current: Option<i64> =
                sqlx::query_scalar("SELECT MAX(stream_position) FROM events WHERE stream_id = $1")
                    .bind(stream_id.as_str())
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(unavailable)?;
            let start = next_position(expected, current, &stream_id)?;

            let mut positions = Vec::with_capacity(events.len());
            let mut types = Vec::with_capacity(events.len());
            let mut payloads = Vec::with_capacity(events.len());
            let mut metadatas = Vec::with_capacity(events.len());
            let mut recorded_ats = Vec::with_capacity(events.len());
            for (offset, event) in events.into_iter().enumerate() {
                positions.push(start + offset as i64);
                types.push(event.event_type);
                payloads.push(event.data);
                recorded_ats.push(event.metadata.recorded_at);
                metadatas.push(
                    serde_json::to_value(&event.metadata)
                        .map_err(|e| EventStoreError::Serialization(e.to_string()))?,
                );
            }

            let rows: Vec<(i64, i64)> = sqlx::query_as(
                "INSERT INTO events (stream_id, stream_position, event_type, data, metadata, recorded_at)
                 SELECT $1, batch.stream_position, batch.event_type, batch.data, batch.metadata, batch.recorded_at
                 FROM UNNEST($2::bigint[], $3::text[], $4::bytea[], $5::jsonb[], $6::timestamptz[])
                      AS batch(stream_position, event_type, data, metadata, recorded_at)
                 ORDER BY batch.stream_position
                 RETURNING stream_position, global_position",
            )
            .bind(stream_id.as_str())
            .bind(&positions)
            .bind(&types)
            .bind(&payloads)
            .bind(&metadatas)
            .bind(&recorded_ats)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| {
                // A unique violation can only come from the
                // (stream_id, stream_position) constraint.
                if e.as_database_error()
                    .is_some_and(|db| db.code().as_deref() == Some("23505"))
                {
                    EventStoreError::ConcurrencyConflict {
                        stream_id: stream_id.clone(),
                        expected,
                        actual: current.map(|v| Version::new(v as u64)),
                    }
                } else {
                    unavailable(e)
                }
            })?;
            tx.commit().await.map_err(unavailable)?;

            let last = rows
                .last()
                .ok_or_else(|| EventStoreError::Unavailable("insert returned no rows".into()))?;
            Ok(AppendOutcome {
                last_version: Version::new(last.0 as u64),
                last_global_position: GlobalPosition::new(last.1 as u64),
            })
        })
    }

    fn read_stream(
        &self,
        stream_id: StreamId,
        from: Option<Version>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<RecordedEvent>, EventStoreError>> + Send + '_>>
    {
        Box::pin(async move {
            let query = format!(
                "{SELECT_COLUMNS} WHERE stream_id = $1 AND stream_position >= $2
                 ORDER BY stream_position"
            );
            let rows: Vec<EventRow> = sqlx::query_as(&query)
                .bind(stream_id.as_str())
                .bind(from.map_or(0, |v| v.value() as i64))
                .fetch_all(&self.pool)
                .await
                .map_err(unavailable)?;
            rows.into_iter().map(EventRow::into_recorded).collect()
        })
    }

    fn read_all(
        &self,
        after: Option<GlobalPosition>,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<RecordedEvent>, EventStoreError>> + Send + '_>>
    {
        Box::pin(async move {
            let query = format!(
                "{SELECT_COLUMNS} WHERE global_position > $1 ORDER BY global_position LIMIT $2"
            );
            let rows: Vec<EventRow> = sqlx::query_as(&query)
                .bind(after.map_or(0, |p| p.value() as i64))
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await
                .map_err(unavailable)?;
            rows.into_iter().map(EventRow::into_recorded).collect()
        })
    }
}
