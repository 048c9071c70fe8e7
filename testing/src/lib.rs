//! # roomline-testing
//!
//! In-memory implementations of every `roomline-core` contract, used across
//! the workspace's tests. The doubles honor the same semantics as the
//! production implementations (expected-version checks, monotonic
//! checkpoints, ordered delivery per topic), so a test that passes here
//! exercises the same contract the Postgres and Redpanda backends implement.

pub mod checkpoint;
pub mod event_bus;
pub mod event_store;
pub mod handlers;
pub mod read_model;

pub use checkpoint::InMemoryCheckpointStore;
pub use event_bus::InMemoryEventBus;
pub use event_store::InMemoryEventStore;
pub use handlers::{DeadLetter, RecordingDeadLetterSink, RecordingHandler};
pub use read_model::InMemoryReadModelStore;

use tracing_subscriber::EnvFilter;

/// Install a test-friendly tracing subscriber, once per process.
///
/// Safe to call from every test; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
