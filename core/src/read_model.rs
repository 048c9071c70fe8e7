//! Key-value storage for denormalized read models.
//!
//! Projections fold events into rows stored here, keyed by a natural query
//! key (booking id, guest id). Rows carry a last-applied-position guard so
//! redelivered events upsert idempotently. Every read model is disposable:
//! it can be rebuilt by replaying the log from the start.

use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors from read-model storage.
#[derive(Error, Debug)]
pub enum ReadModelError {
    /// The backing store could not be reached.
    #[error("read model storage error: {0}")]
    Storage(String),

    /// A row failed to (de)serialize.
    #[error("read model serialization error: {0}")]
    Serialization(String),
}

/// Upsert-by-key storage for projection rows.
///
/// Values are opaque bytes; projections own their row encoding.
pub trait ReadModelStore: Send + Sync {
    /// Insert or replace the row at `key`.
    ///
    /// # Errors
    ///
    /// Returns [`ReadModelError::Storage`] when the write fails.
    fn save<'a>(
        &'a self,
        key: &'a str,
        data: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), ReadModelError>> + Send + 'a>>;

    /// Fetch the row at `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`ReadModelError::Storage`] when the read fails.
    fn get<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Vec<u8>>, ReadModelError>> + Send + 'a>>;

    /// Delete the row at `key`. Deleting a missing row is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`ReadModelError::Storage`] when the delete fails.
    fn delete<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), ReadModelError>> + Send + 'a>>;
}
