//! In-memory checkpoint store.

use roomline_core::checkpoint::{CheckpointError, CheckpointStore};
use roomline_core::stream::GlobalPosition;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory [`CheckpointStore`] for tests.
///
/// Saves are monotonic, matching the Postgres store: a save below the stored
/// position is ignored, so a replaying subscription can never move its own
/// cursor backwards.
#[derive(Clone, Default)]
pub struct InMemoryCheckpointStore {
    positions: Arc<RwLock<HashMap<String, GlobalPosition>>>,
}

impl InMemoryCheckpointStore {
    /// Create an empty checkpoint store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current position for `subscription_id`, for assertions.
    pub async fn position(&self, subscription_id: &str) -> Option<GlobalPosition> {
        self.positions.read().await.get(subscription_id).copied()
    }
}

impl CheckpointStore for InMemoryCheckpointStore {
    fn load<'a>(
        &'a self,
        subscription_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<GlobalPosition>, CheckpointError>> + Send + 'a>>
    {
        Box::pin(async move { Ok(self.positions.read().await.get(subscription_id).copied()) })
    }

    fn save<'a>(
        &'a self,
        subscription_id: &'a str,
        position: GlobalPosition,
    ) -> Pin<Box<dyn Future<Output = Result<(), CheckpointError>> + Send + 'a>> {
        Box::pin(async move {
            let mut positions = self.positions.write().await;
            let entry = positions.entry(subscription_id.to_string()).or_insert(position);
            *entry = (*entry).max(position);
            Ok(())
        })
    }
}
