//! Built-in domain tools for notegraph.
//!
//! Tools give the agent read/write access to the knowledge base: the items
//! under an object and the resources attached to a project or workspace.
//! Every tool goes through the [`EntityStore`] it was built with.

pub mod args;
pub mod items;
pub mod resources;

use notegraph_core::error::{StoreError, ToolError};
use notegraph_core::store::{EntityStore, Record};
use notegraph_core::tool::ToolRegistry;
use std::sync::Arc;

/// Create the tool registry with every built-in tool bound to `store`.
pub fn default_registry(store: Arc<dyn EntityStore>) -> Result<ToolRegistry, ToolError> {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(items::ListItemsTool::new(store.clone())))?;
    registry.register(Box::new(items::GetItemTool::new(store.clone())))?;
    registry.register(Box::new(items::CreateItemTool::new(store.clone())))?;
    registry.register(Box::new(items::UpdateItemTool::new(store.clone())))?;
    registry.register(Box::new(resources::ListResourcesTool::new(store.clone())))?;
    registry.register(Box::new(resources::AddResourceTool::new(store)))?;
    Ok(registry)
}

/// Flatten a record into `{ "id": ..., ...data }` for the model.
pub(crate) fn record_json(record: &Record) -> serde_json::Value {
    let mut out = serde_json::Map::with_capacity(record.data.len() + 2);
    out.insert("id".into(), record.id.clone().into());
    out.insert("updatedAt".into(), record.updated_at.to_rfc3339().into());
    out.extend(record.data.clone());
    serde_json::Value::Object(out)
}

pub(crate) fn store_error(tool_name: &str, error: StoreError) -> ToolError {
    ToolError::ExecutionFailed {
        tool_name: tool_name.into(),
        reason: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notegraph_core::tool::ToolCall;
    use notegraph_store::InMemoryStore;

    #[test]
    fn default_registry_has_all_tools() {
        let registry = default_registry(Arc::new(InMemoryStore::new())).unwrap();
        assert_eq!(
            registry.names(),
            vec![
                "add_resource",
                "create_item",
                "get_item",
                "list_items",
                "list_resources",
                "update_item"
            ]
        );
    }

    #[tokio::test]
    async fn registry_reports_missing_arguments_as_error_result() {
        let registry = default_registry(Arc::new(InMemoryStore::new())).unwrap();
        let result = registry
            .execute(&ToolCall {
                id: "c1".into(),
                name: "create_item".into(),
                arguments: serde_json::json!({"objectId": "o1"}),
            })
            .await;
        assert!(result.is_error);
        assert!(result.output.contains("title"));
    }
}
