//! PostgreSQL read-model storage.

use roomline_core::read_model::{ReadModelError, ReadModelStore};
use sqlx::PgPool;
use std::future::Future;
use std::pin::Pin;

/// PostgreSQL-backed [`ReadModelStore`].
///
/// Generic key-value storage in a configurable table:
///
/// ```sql
/// CREATE TABLE read_models (
///     key TEXT PRIMARY KEY,
///     data BYTEA NOT NULL,
///     updated_at TIMESTAMPTZ NOT NULL
/// );
/// ```
///
/// Projections that need queryable columns own their tables and use the pool
/// directly; this store covers the common fetch-by-key case.
#[derive(Clone)]
pub struct PostgresReadModelStore {
    pool: PgPool,
    table_name: String,
}

impl PostgresReadModelStore {
    /// Create a store writing to `table_name`.
    #[must_use]
    pub const fn new(pool: PgPool, table_name: String) -> Self {
        Self { pool, table_name }
    }

    fn storage(e: sqlx::Error) -> ReadModelError {
        ReadModelError::Storage(e.to_string())
    }
}

impl ReadModelStore for PostgresReadModelStore {
    fn save<'a>(
        &'a self,
        key: &'a str,
        data: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), ReadModelError>> + Send + 'a>> {
        Box::pin(async move {
            // Table name is configured at startup, not user input.
            let query = format!(
                "INSERT INTO {} (key, data, updated_at)
                 VALUES ($1, $2, now())
                 ON CONFLICT (key) DO UPDATE
                 SET data = EXCLUDED.data, updated_at = now()",
                self.table_name
            );
            sqlx::query(&query)
                .bind(key)
                .bind(data)
                .execute(&self.pool)
                .await
                .map_err(Self::storage)?;
            Ok(())
        })
    }

    fn get<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Vec<u8>>, ReadModelError>> + Send + 'a>> {
        Box::pin(async move {
            let query = format!("SELECT data FROM {} WHERE key = $1", self.table_name);
            let row: Option<(Vec<u8>,)> = sqlx::query_as(&query)
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(Self::storage)?;
            Ok(row.map(|(data,)| data))
        })
    }

    fn delete<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), ReadModelError>> + Send + 'a>> {
        Box::pin(async move {
            let query = format!("DELETE FROM {} WHERE key = $1", self.table_name);
            sqlx::query(&query)
                .bind(key)
                .execute(&self.pool)
                .await
                .map_err(Self::storage)?;
            Ok(())
        })
    }
}
