//! File-based store: the whole store as one JSON document.
//!
//! Records are loaded into memory on creation and flushed to disk on every
//! mutation. Writes go to a sibling temp file which is then renamed over the
//! target, so a crash mid-write never leaves a truncated store behind.
//!
//! Storage location: `~/.notegraph/store.json` unless configured otherwise.

use async_trait::async_trait;
use notegraph_core::error::StoreError;
use notegraph_core::store::{Collection, EntityStore, ListFilter, Record};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::Tables;

pub struct JsonFileStore {
    path: PathBuf,
    tables: RwLock<Tables>,
}

impl JsonFileStore {
    /// Open the store at `path`.
    ///
    /// A missing file starts empty (the file is created on first write). A
    /// file that exists but cannot be parsed is an error: silently starting
    /// over would discard the user's data on the next flush.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let tables = Self::load_from_disk(&path)?;
        debug!(path = %path.display(), records = tables.len(), "JSON file store loaded");
        Ok(Self {
            path,
            tables: RwLock::new(tables),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_from_disk(path: &Path) -> Result<Tables, StoreError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Tables::default()),
            Err(e) => {
                return Err(StoreError::Storage(format!(
                    "Failed to read store file {}: {e}",
                    path.display()
                )));
            }
        };
        if content.trim().is_empty() {
            warn!(path = %path.display(), "Store file is empty, starting fresh");
            return Ok(Tables::default());
        }
        serde_json::from_str(&content).map_err(|e| {
            StoreError::Storage(format!("Corrupted store file {}: {e}", path.display()))
        })
    }

    /// Write the tables to disk via temp file + rename.
    async fn flush(&self, tables: &Tables) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StoreError::Storage(format!("Failed to create store directory: {e}"))
            })?;
        }

        let content = serde_json::to_vec_pretty(tables)
            .map_err(|e| StoreError::Storage(format!("Failed to serialize store: {e}")))?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, &content)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to write store file: {e}")))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to replace store file: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl EntityStore for JsonFileStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Record>, StoreError> {
        Ok(self.tables.read().await.get(collection, id).cloned())
    }

    async fn list(&self, collection: Collection, filter: &ListFilter) -> Result<Vec<Record>, StoreError> {
        Ok(self.tables.read().await.list(collection, filter))
    }

    async fn create(&self, collection: Collection, data: serde_json::Value) -> Result<Record, StoreError> {
        // Hold the write lock across the flush so concurrent writers serialize.
        let mut tables = self.tables.write().await;
        let mut staged = tables.clone();
        let record = staged.create(collection, data)?;
        self.flush(&staged).await?;
        *tables = staged;
        Ok(record)
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        patch: serde_json::Value,
    ) -> Result<Record, StoreError> {
        let mut tables = self.tables.write().await;
        let mut staged = tables.clone();
        let record = staged.update(collection, id, patch)?;
        self.flush(&staged).await?;
        *tables = staged;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");

        {
            let store = JsonFileStore::open(&path).unwrap();
            store
                .create(Collection::Workflows, json!({"id": "wf-1", "name": "Daily"}))
                .await
                .unwrap();
            store
                .update(Collection::Workflows, "wf-1", json!({"name": "Weekly"}))
                .await
                .unwrap();
        }

        let reopened = JsonFileStore::open(&path).unwrap();
        let wf = reopened.get(Collection::Workflows, "wf-1").await.unwrap().unwrap();
        assert_eq!(wf.str_field("name"), Some("Weekly"));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("absent.json")).unwrap();
        let all = store.list(Collection::Items, &ListFilter::all()).await.unwrap();
        assert!(all.is_empty());
        assert_eq!(store.name(), "file");
    }

    #[test]
    fn corrupted_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(JsonFileStore::open(&path).is_err());
    }

    #[tokio::test]
    async fn failed_mutation_leaves_state_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("store.json")).unwrap();
        assert!(store.update(Collection::Items, "ghost", json!({})).await.is_err());
        assert!(store.create(Collection::Items, json!(42)).await.is_err());
        let all = store.list(Collection::Items, &ListFilter::all()).await.unwrap();
        assert!(all.is_empty());
    }
}
