//! Entity store backends for notegraph.
//!
//! Both backends share the same in-memory table layout ([`Tables`]); the
//! file backend additionally serializes it to disk after every mutation.

pub mod in_memory;
pub mod json_file;

pub use in_memory::InMemoryStore;
pub use json_file::JsonFileStore;

use chrono::Utc;
use notegraph_core::error::StoreError;
use notegraph_core::store::{Collection, ListFilter, Record};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Records grouped by collection, each collection in creation order.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tables {
    collections: BTreeMap<Collection, Vec<Record>>,
}

impl Tables {
    pub fn get(&self, collection: Collection, id: &str) -> Option<&Record> {
        self.collections
            .get(&collection)
            .and_then(|records| records.iter().find(|r| r.id == id))
    }

    pub fn list(&self, collection: Collection, filter: &ListFilter) -> Vec<Record> {
        self.collections
            .get(&collection)
            .map(|records| records.iter().filter(|r| filter.accepts(r)).cloned().collect())
            .unwrap_or_default()
    }

    pub fn create(&mut self, collection: Collection, data: serde_json::Value) -> Result<Record, StoreError> {
        let serde_json::Value::Object(mut data) = data else {
            return Err(StoreError::InvalidRecord(format!(
                "{collection} record body must be a JSON object"
            )));
        };

        let id = match data.remove("id") {
            Some(serde_json::Value::String(id)) if !id.is_empty() => id,
            _ => Uuid::new_v4().to_string(),
        };
        if self.get(collection, &id).is_some() {
            return Err(StoreError::InvalidRecord(format!(
                "{collection} record '{id}' already exists"
            )));
        }

        let now = Utc::now();
        let record = Record {
            id,
            created_at: now,
            updated_at: now,
            data,
        };
        self.collections
            .entry(collection)
            .or_default()
            .push(record.clone());
        Ok(record)
    }

    pub fn update(
        &mut self,
        collection: Collection,
        id: &str,
        patch: serde_json::Value,
    ) -> Result<Record, StoreError> {
        let serde_json::Value::Object(patch) = patch else {
            return Err(StoreError::InvalidRecord("patch must be a JSON object".into()));
        };

        let record = self
            .collections
            .get_mut(&collection)
            .and_then(|records| records.iter_mut().find(|r| r.id == id))
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;

        for (key, value) in patch {
            if key != "id" {
                record.data.insert(key, value);
            }
        }
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    /// Total number of records across all collections.
    pub fn len(&self) -> usize {
        self.collections.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
