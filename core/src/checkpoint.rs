//! Durable per-subscription cursors into the global log.
//!
//! A checkpoint records the highest global position a subscription has fully
//! processed. The owning subscription engine is the only writer for its
//! subscription id, which serializes writes by construction; stores may
//! additionally guard against regression (the Postgres implementation does).

use crate::stream::GlobalPosition;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors from checkpoint persistence.
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// The backing store could not be reached. Transient; the engine retries
    /// and does not advance past unpersisted progress.
    #[error("checkpoint store unavailable: {0}")]
    Unavailable(String),
}

/// Durable upsert-by-key storage for subscription progress.
pub trait CheckpointStore: Send + Sync {
    /// Load the last saved position for `subscription_id`; `None` means the
    /// subscription has never run and starts from the beginning of the log.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::Unavailable`] on infrastructure failure.
    fn load<'a>(
        &'a self,
        subscription_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<GlobalPosition>, CheckpointError>> + Send + 'a>>;

    /// Persist `position` for `subscription_id`. A saved position must never
    /// regress for a given subscription.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::Unavailable`] on infrastructure failure.
    fn save<'a>(
        &'a self,
        subscription_id: &'a str,
        position: GlobalPosition,
    ) -> Pin<Box<dyn Future<Output = Result<(), CheckpointError>> + Send + 'a>>;
}
