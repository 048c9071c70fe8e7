//! # roomline-runtime
//!
//! Command execution runtime for roomline services.
//!
//! - [`service::CommandService`]: drives the `Load → Decide → Append` cycle
//!   against any [`roomline_core::EventStore`], retrying optimistic
//!   concurrency conflicts a bounded number of times.
//! - [`retry`]: the shared exponential-backoff policy used wherever a
//!   transient infrastructure failure is worth another attempt.

pub mod retry;
pub mod service;

pub use retry::{RetryPolicy, retry_with_predicate};
pub use service::{CommandService, DEFAULT_MAX_ATTEMPTS};
