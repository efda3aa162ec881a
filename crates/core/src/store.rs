//! EntityStore trait: the external home of domain entities.
//!
//! The orchestrator never owns projects, workspaces, items or contexts. It
//! reads and writes them through this key-value interface over named
//! collections. Consistency guarantees belong to the backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// The named collections the orchestrator touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Projects,
    Workspaces,
    Objects,
    Items,
    Resources,
    Contexts,
    ContextNodes,
    ContextEdges,
    Workflows,
}

impl Collection {
    pub const ALL: [Collection; 9] = [
        Collection::Projects,
        Collection::Workspaces,
        Collection::Objects,
        Collection::Items,
        Collection::Resources,
        Collection::Contexts,
        Collection::ContextNodes,
        Collection::ContextEdges,
        Collection::Workflows,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Projects => "projects",
            Collection::Workspaces => "workspaces",
            Collection::Objects => "objects",
            Collection::Items => "items",
            Collection::Resources => "resources",
            Collection::Contexts => "contexts",
            Collection::ContextNodes => "context_nodes",
            Collection::ContextEdges => "context_edges",
            Collection::Workflows => "workflows",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored entity: an id, timestamps and a free-form JSON object body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub data: serde_json::Map<String, serde_json::Value>,
}

impl Record {
    /// Read a string field from the record body.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }

    /// Whether `data[key]` equals the given string value.
    pub fn matches(&self, key: &str, value: &str) -> bool {
        self.str_field(key) == Some(value)
    }
}

/// Equality filter for [`EntityStore::list`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListFilter {
    pub field_equals: Vec<(String, String)>,
}

impl ListFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field_equals: vec![(field.into(), value.into())],
        }
    }

    pub fn accepts(&self, record: &Record) -> bool {
        self.field_equals.iter().all(|(k, v)| record.matches(k, v))
    }
}

/// The storage interface consumed by tools and workflow steps.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Name of the backend (e.g., "memory", "file").
    fn name(&self) -> &str;

    /// Fetch one record by id.
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Record>, StoreError>;

    /// List records of a collection in creation order.
    async fn list(&self, collection: Collection, filter: &ListFilter) -> Result<Vec<Record>, StoreError>;

    /// Create a record. `data` must be a JSON object; the store assigns the id
    /// unless `data.id` is a non-empty string.
    async fn create(&self, collection: Collection, data: serde_json::Value) -> Result<Record, StoreError>;

    /// Shallow-merge `patch` (a JSON object) into an existing record.
    async fn update(
        &self,
        collection: Collection,
        id: &str,
        patch: serde_json::Value,
    ) -> Result<Record, StoreError>;
}
