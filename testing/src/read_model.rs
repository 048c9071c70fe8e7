//! In-memory read-model store.

use roomline_core::read_model::{ReadModelError, ReadModelStore};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory [`ReadModelStore`] for tests.
#[derive(Clone, Default)]
pub struct InMemoryReadModelStore {
    rows: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl InMemoryReadModelStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows, for assertions.
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    /// Whether the store holds no rows.
    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

impl ReadModelStore for InMemoryReadModelStore {
    fn save<'a>(
        &'a self,
        key: &'a str,
        data: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), ReadModelError>> + Send + 'a>> {
        Box::pin(async move {
            self.rows.write().await.insert(key.to_string(), data.to_vec());
            Ok(())
        })
    }

    fn get<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Vec<u8>>, ReadModelError>> + Send + 'a>> {
        Box::pin(async move { Ok(self.rows.read().await.get(key).cloned()) })
    }

    fn delete<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), ReadModelError>> + Send + 'a>> {
        Box::pin(async move {
            self.rows.write().await.remove(key);
            Ok(())
        })
    }
}
