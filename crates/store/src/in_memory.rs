//! In-memory store: useful for testing and ephemeral sessions.

use async_trait::async_trait;
use notegraph_core::error::StoreError;
use notegraph_core::store::{Collection, EntityStore, ListFilter, Record};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Tables;

/// An in-memory entity store. Contents are lost when the process exits.
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
        }
    }

    /// Number of records across all collections.
    pub async fn len(&self) -> usize {
        self.tables.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tables.read().await.is_empty()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EntityStore for InMemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Record>, StoreError> {
        Ok(self.tables.read().await.get(collection, id).cloned())
    }

    async fn list(&self, collection: Collection, filter: &ListFilter) -> Result<Vec<Record>, StoreError> {
        Ok(self.tables.read().await.list(collection, filter))
    }

    async fn create(&self, collection: Collection, data: serde_json::Value) -> Result<Record, StoreError> {
        self.tables.write().await.create(collection, data)
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        patch: serde_json::Value,
    ) -> Result<Record, StoreError> {
        self.tables.write().await.update(collection, id, patch)
    }
}
