//! Item tools: read and write the items that belong to an object.

use async_trait::async_trait;
use notegraph_core::error::ToolError;
use notegraph_core::store::{Collection, EntityStore, ListFilter};
use notegraph_core::tool::Tool;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::debug;

use crate::args::{self, MAX_CONTENT_CHARS, MAX_TITLE_CHARS};
use crate::{record_json, store_error};

/// Lists the items of one object.
pub struct ListItemsTool {
    store: Arc<dyn EntityStore>,
}

impl ListItemsTool {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ListItemsTool {
    fn name(&self) -> &str {
        "list_items"
    }

    fn description(&self) -> &str {
        "List the items stored under an object, newest last. Returns id, title and content preview."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "objectId": {
                    "type": "string",
                    "description": "The object whose items to list"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of items to return (default 50)"
                }
            },
            "required": ["objectId"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let object_id = args::require_id(&arguments, "objectId")?;
        let limit = args::limit(&arguments);

        let items = self
            .store
            .list(Collection::Items, &ListFilter::eq("objectId", object_id))
            .await
            .map_err(|e| store_error(self.name(), e))?;
        debug!(object_id, count = items.len(), "Listed items");

        let listed: Vec<Value> = items
            .iter()
            .take(limit)
            .map(|item| {
                let preview: String = item.str_field("content").unwrap_or("").chars().take(200).collect();
                json!({
                    "id": item.id,
                    "title": item.str_field("title").unwrap_or(""),
                    "preview": preview,
                })
            })
            .collect();
        Ok(json!({ "objectId": object_id, "total": items.len(), "items": listed }))
    }
}

/// Fetches one item by id.
pub struct GetItemTool {
    store: Arc<dyn EntityStore>,
}

impl GetItemTool {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for GetItemTool {
    fn name(&self) -> &str {
        "get_item"
    }

    fn description(&self) -> &str {
        "Fetch a single item, including its full content."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "id": { "type": "string", "description": "The item id" }
            },
            "required": ["id"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let id = args::require_id(&arguments, "id")?;
        let item = self
            .store
            .get(Collection::Items, id)
            .await
            .map_err(|e| store_error(self.name(), e))?
            .ok_or_else(|| ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: format!("item '{id}' does not exist"),
            })?;
        Ok(record_json(&item))
    }
}

/// Creates an item under an object.
pub struct CreateItemTool {
    store: Arc<dyn EntityStore>,
}

impl CreateItemTool {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for CreateItemTool {
    fn name(&self) -> &str {
        "create_item"
    }

    fn description(&self) -> &str {
        "Create a new item under an object. Use a short, descriptive title and put the body in content."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "objectId": { "type": "string", "description": "The object to add the item to" },
                "title": { "type": "string", "description": "Item title (max 200 characters)" },
                "content": { "type": "string", "description": "Optional long-form content" }
            },
            "required": ["objectId", "title"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let object_id = args::require_id(&arguments, "objectId")?;
        let title = args::require_text(&arguments, "title", MAX_TITLE_CHARS)?;
        let content = args::optional_text(&arguments, "content", MAX_CONTENT_CHARS)?.unwrap_or("");

        let item = self
            .store
            .create(
                Collection::Items,
                json!({ "objectId": object_id, "title": title, "content": content }),
            )
            .await
            .map_err(|e| store_error(self.name(), e))?;
        debug!(item_id = %item.id, object_id, "Created item");
        Ok(record_json(&item))
    }
}

/// Changes the title and/or content of an existing item.
pub struct UpdateItemTool {
    store: Arc<dyn EntityStore>,
}

impl UpdateItemTool {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for UpdateItemTool {
    fn name(&self) -> &str {
        "update_item"
    }

    fn description(&self) -> &str {
        "Update an existing item's title and/or content. Omitted fields are left unchanged."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "id": { "type": "string", "description": "The item id" },
                "title": { "type": "string", "description": "New title" },
                "content": { "type": "string", "description": "New content (replaces the old content)" }
            },
            "required": ["id"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let id = args::require_id(&arguments, "id")?;
        let mut patch = serde_json::Map::new();
        if arguments.get("title").is_some_and(|t| !t.is_null()) {
            let title = args::require_text(&arguments, "title", MAX_TITLE_CHARS)?;
            patch.insert("title".into(), title.into());
        }
        if let Some(content) = args::optional_text(&arguments, "content", MAX_CONTENT_CHARS)? {
            patch.insert("content".into(), content.into());
        }
        if patch.is_empty() {
            return Err(ToolError::InvalidArguments(
                "provide at least one of 'title' or 'content'".into(),
            ));
        }

        let item = self
            .store
            .update(Collection::Items, id, Value::Object(patch))
            .await
            .map_err(|e| store_error(self.name(), e))?;
        Ok(record_json(&item))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notegraph_store::InMemoryStore;

    fn store() -> Arc<dyn EntityStore> {
        Arc::new(InMemoryStore::new())
    }

    #[tokio::test]
    async fn create_then_list_and_get() {
        let store = store();
        let created = CreateItemTool::new(store.clone())
            .execute(json!({"objectId": "o1", "title": "Ownership", "content": "Moves and borrows"}))
            .await
            .unwrap();
        let id = created["id"].as_str().unwrap().to_string();
        assert_eq!(created["objectId"], "o1");

        let listed = ListItemsTool::new(store.clone())
            .execute(json!({"objectId": "o1"}))
            .await
            .unwrap();
        assert_eq!(listed["total"], 1);
        assert_eq!(listed["items"][0]["title"], "Ownership");

        let fetched = GetItemTool::new(store).execute(json!({"id": id})).await.unwrap();
        assert_eq!(fetched["content"], "Moves and borrows");
    }

    #[tokio::test]
    async fn get_unknown_item_fails() {
        let err = GetItemTool::new(store())
            .execute(json!({"id": "missing"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[tokio::test]
    async fn create_rejects_hostile_ids() {
        let err = CreateItemTool::new(store())
            .execute(json!({"objectId": "../o1", "title": "x"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn update_requires_a_change() {
        let store = store();
        let created = CreateItemTool::new(store.clone())
            .execute(json!({"objectId": "o1", "title": "Draft"}))
            .await
            .unwrap();
        let tool = UpdateItemTool::new(store);
        let id = created["id"].clone();

        assert!(tool.execute(json!({"id": id})).await.is_err());

        let updated = tool.execute(json!({"id": id, "title": "Final"})).await.unwrap();
        assert_eq!(updated["title"], "Final");
        assert_eq!(updated["objectId"], "o1");
    }
}
