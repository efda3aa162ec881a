//! Resource tools: reference material attached to a project or workspace.

use async_trait::async_trait;
use notegraph_core::error::ToolError;
use notegraph_core::store::{Collection, EntityStore, ListFilter};
use notegraph_core::tool::Tool;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::args::{self, MAX_CONTENT_CHARS, MAX_TITLE_CHARS};
use crate::{record_json, store_error};

/// Resolve the `projectId` / `workspaceId` pair to exactly one scope.
fn scope(arguments: &Value) -> Result<(&'static str, &str), ToolError> {
    match (
        args::optional_id(arguments, "projectId")?,
        args::optional_id(arguments, "workspaceId")?,
    ) {
        (Some(project), None) => Ok(("projectId", project)),
        (None, Some(workspace)) => Ok(("workspaceId", workspace)),
        _ => Err(ToolError::InvalidArguments(
            "provide exactly one of 'projectId' or 'workspaceId'".into(),
        )),
    }
}

pub struct ListResourcesTool {
    store: Arc<dyn EntityStore>,
}

impl ListResourcesTool {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ListResourcesTool {
    fn name(&self) -> &str {
        "list_resources"
    }

    fn description(&self) -> &str {
        "List the reference resources attached to a project or a workspace."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "projectId": { "type": "string" },
                "workspaceId": { "type": "string" },
                "limit": { "type": "integer" }
            }
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let (field, id) = scope(&arguments)?;
        let resources = self
            .store
            .list(Collection::Resources, &ListFilter::eq(field, id))
            .await
            .map_err(|e| store_error(self.name(), e))?;
        let listed: Vec<Value> = resources
            .iter()
            .take(args::limit(&arguments))
            .map(record_json)
            .collect();
        Ok(Value::Array(listed))
    }
}

pub struct AddResourceTool {
    store: Arc<dyn EntityStore>,
}

impl AddResourceTool {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for AddResourceTool {
    fn name(&self) -> &str {
        "add_resource"
    }

    fn description(&self) -> &str {
        "Attach a resource (a note, excerpt or link) to a project or a workspace."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "projectId": { "type": "string" },
                "workspaceId": { "type": "string" },
                "name": { "type": "string", "description": "Display name of the resource" },
                "content": { "type": "string" },
                "summary": { "type": "string" },
                "url": { "type": "string" }
            },
            "required": ["name"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let (field, id) = scope(&arguments)?;
        let name = args::require_text(&arguments, "name", MAX_TITLE_CHARS)?;

        let mut data = serde_json::Map::new();
        data.insert(field.into(), id.into());
        data.insert("name".into(), name.into());
        for key in ["content", "summary", "url"] {
            if let Some(text) = args::optional_text(&arguments, key, MAX_CONTENT_CHARS)? {
                data.insert(key.into(), text.into());
            }
        }

        let resource = self
            .store
            .create(Collection::Resources, Value::Object(data))
            .await
            .map_err(|e| store_error(self.name(), e))?;
        Ok(record_json(&resource))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notegraph_store::InMemoryStore;

    #[tokio::test]
    async fn add_and_list_by_scope() {
        let store: Arc<dyn EntityStore> = Arc::new(InMemoryStore::new());
        let add = AddResourceTool::new(store.clone());
        add.execute(json!({"workspaceId": "w1", "name": "Paper", "url": "https://example.org"}))
            .await
            .unwrap();
        add.execute(json!({"projectId": "p1", "name": "Notes", "content": "..."}))
            .await
            .unwrap();

        let listed = ListResourcesTool::new(store)
            .execute(json!({"workspaceId": "w1"}))
            .await
            .unwrap();
        let listed = listed.as_array().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0]["name"], "Paper");
    }

    #[tokio::test]
    async fn ambiguous_scope_rejected() {
        let store: Arc<dyn EntityStore> = Arc::new(InMemoryStore::new());
        let err = AddResourceTool::new(store.clone())
            .execute(json!({"workspaceId": "w1", "projectId": "p1", "name": "x"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));

        assert!(ListResourcesTool::new(store).execute(json!({})).await.is_err());
    }
}
