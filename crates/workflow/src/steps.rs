//! Step handlers, dispatched by [`StepKind`] through a closed `match`.
//!
//! Each handler gets the step definition, the previous step's output and the
//! run's [`ExecutionContext`], and returns its own textual output.

use crate::context::{ExecutionContext, StepError};
use crate::model::{Step, StepKind};
use notegraph_agent::resources::truncate_chars;
use notegraph_core::principal::Principal;
use notegraph_core::store::Collection;
use serde_json::{Map, Value, json};
use tracing::debug;

/// Returned by `summarize` when there is nothing to summarize.
pub const NOTHING_TO_SUMMARIZE: &str = "Nothing to summarize: no previous step produced output.";

const RESEARCH_SYSTEM: &str = "You are a meticulous research assistant. Write clear, \
well-structured overviews that separate established facts from open questions.";

const SUMMARIZE_SYSTEM: &str = "You are an expert editor. Summarize faithfully and concisely, \
keeping every key point and dropping repetition.";

const TITLE_SYSTEM: &str = "You write short, specific titles. Reply with the title only, \
without quotes or punctuation at the end.";

const CONTEXT_SYSTEM: &str = "You turn text into a concept map. Reply with a JSON array only. \
Each element is an object {\"content\": string, \"parentIndex\": number} where parentIndex is \
the array index of an earlier element, or omitted for top-level concepts.";

const CUSTOM_SYSTEM: &str = "You are a helpful assistant.";

const INPUT_PLACEHOLDER: &str = "{{input}}";

/// Run one step.
pub async fn execute_step(
    step: &Step,
    previous: Option<&str>,
    ctx: &ExecutionContext,
) -> Result<String, StepError> {
    let previous = previous.filter(|p| !p.trim().is_empty());
    debug!(step_id = %step.id, kind = %step.kind, has_input = previous.is_some(), "Executing step");

    match step.kind {
        StepKind::Research => research(step, previous, ctx).await,
        StepKind::Summarize => summarize(previous, ctx).await,
        StepKind::CreateItem => create_item(step, previous, ctx).await,
        StepKind::AddResource => add_resource(step, previous, ctx).await,
        StepKind::GenerateContext => generate_context(step, previous, ctx).await,
        StepKind::CustomPrompt => custom_prompt(step, previous, ctx).await,
    }
}

async fn research(
    step: &Step,
    previous: Option<&str>,
    ctx: &ExecutionContext,
) -> Result<String, StepError> {
    let topic = step
        .config_value("topic")
        .or(previous)
        .ok_or(StepError::MissingConfig {
            step_type: "research",
            key: "topic",
        })?;
    let prompt = format!(
        "Research the following topic. Cover the key concepts, important facts, \
         common misconceptions and open questions.\n\nTopic: {topic}"
    );
    Ok(ctx.agent.prompt(RESEARCH_SYSTEM, &prompt, &ctx.cancel).await?)
}

async fn summarize(previous: Option<&str>, ctx: &ExecutionContext) -> Result<String, StepError> {
    let Some(input) = previous else {
        return Ok(NOTHING_TO_SUMMARIZE.to_string());
    };
    let prompt = format!("Summarize the following text:\n\n{input}");
    Ok(ctx.agent.prompt(SUMMARIZE_SYSTEM, &prompt, &ctx.cancel).await?)
}

async fn create_item(
    step: &Step,
    previous: Option<&str>,
    ctx: &ExecutionContext,
) -> Result<String, StepError> {
    let object_id = require(step, "objectId")?;
    let content = previous.ok_or_else(|| {
        StepError::MissingInput("create_item needs output from a previous step".into())
    })?;

    let prompt = format!(
        "Write a title of at most {} characters for this text:\n\n{}",
        ctx.title_max_chars,
        truncate_chars(content, 4_000)
    );
    let suggested = ctx.agent.prompt(TITLE_SYSTEM, &prompt, &ctx.cancel).await?;
    let title = make_title(&suggested, content, ctx.title_max_chars);

    let item = ctx
        .store
        .create(
            Collection::Items,
            attributed(json!({ "objectId": object_id, "title": title }), &ctx.principal),
        )
        .await?;
    ctx.store
        .update(Collection::Items, &item.id, json!({ "content": content }))
        .await?;

    debug!(item_id = %item.id, object_id, "Created item from workflow");
    Ok(format!("Created item \"{title}\" in object {object_id}"))
}

async fn add_resource(
    step: &Step,
    previous: Option<&str>,
    ctx: &ExecutionContext,
) -> Result<String, StepError> {
    let target = step.config_value("target").unwrap_or("workspace");
    if target != "project" && target != "workspace" {
        return Err(StepError::InvalidConfig(format!(
            "add_resource target must be 'project' or 'workspace', got '{target}'"
        )));
    }
    let content = previous.ok_or_else(|| {
        StepError::MissingInput("add_resource needs output from a previous step".into())
    })?;

    let (field, scope_id, label) = match (
        target,
        ctx.scope.project_id.as_deref(),
        ctx.scope.workspace_id.as_deref(),
    ) {
        ("project", Some(project), _) => ("projectId", project, "project"),
        (_, _, Some(workspace)) => ("workspaceId", workspace, "workspace"),
        _ => return Err(StepError::NoScope("workspace")),
    };

    let name = step
        .config_value("name")
        .or_else(|| Some(step.name.trim()).filter(|n| !n.is_empty()))
        .unwrap_or("Workflow output");

    let mut data = Map::new();
    data.insert(field.into(), scope_id.into());
    data.insert("name".into(), name.into());
    data.insert("content".into(), content.into());
    ctx.store
        .create(Collection::Resources, attributed(Value::Object(data), &ctx.principal))
        .await?;

    Ok(format!("Added resource \"{name}\" to {label} {scope_id}"))
}

async fn generate_context(
    step: &Step,
    previous: Option<&str>,
    ctx: &ExecutionContext,
) -> Result<String, StepError> {
    let context_id = require(step, "contextId")?;
    let source = previous.ok_or_else(|| {
        StepError::MissingInput("generate_context needs output from a previous step".into())
    })?;

    let prompt = format!("Convert this text into concept-map nodes:\n\n{source}");
    let reply = ctx.agent.prompt(CONTEXT_SYSTEM, &prompt, &ctx.cancel).await?;
    let nodes = parse_nodes(&reply)?;

    // created[i] is the id of the node built from element i, if any
    let mut created: Vec<Option<String>> = Vec::with_capacity(nodes.len());
    let mut links = 0;
    for (i, node) in nodes.iter().enumerate() {
        let Some(content) = &node.content else {
            created.push(None);
            continue;
        };
        let parent_id = node
            .parent_index
            .filter(|&j| j < i)
            .and_then(|j| created[j].clone());

        let mut data = json!({ "contextId": context_id, "content": content, "position": i });
        if let Some(parent) = &parent_id {
            data["parentId"] = json!(parent);
        }
        let record = ctx.store.create(Collection::ContextNodes, data).await?;

        if let Some(parent) = parent_id {
            ctx.store
                .create(
                    Collection::ContextEdges,
                    json!({ "contextId": context_id, "source": parent, "target": record.id }),
                )
                .await?;
            links += 1;
        }
        created.push(Some(record.id));
    }

    let count = created.iter().flatten().count();
    if count == 0 {
        return Err(StepError::InvalidOutput("no nodes with content".into()));
    }
    Ok(format!(
        "Created {count} nodes and {links} links in context {context_id}"
    ))
}

async fn custom_prompt(
    step: &Step,
    previous: Option<&str>,
    ctx: &ExecutionContext,
) -> Result<String, StepError> {
    let template = require(step, "prompt")?;
    let prompt = template.replace(INPUT_PLACEHOLDER, previous.unwrap_or(""));
    Ok(ctx.agent.prompt(CUSTOM_SYSTEM, &prompt, &ctx.cancel).await?)
}

fn require<'a>(step: &'a Step, key: &'static str) -> Result<&'a str, StepError> {
    step.config_value(key).ok_or(StepError::MissingConfig {
        step_type: step.kind.as_str(),
        key,
    })
}

/// Stamp the creating principal onto a record body.
fn attributed(mut data: Value, principal: &Principal) -> Value {
    if !principal.is_anonymous() {
        data["createdBy"] = json!(principal.subject);
    }
    data
}

/// Clean up a model-suggested title; fall back to the content's first line.
pub(crate) fn make_title(suggested: &str, content: &str, max_chars: usize) -> String {
    let first_line = |s: &str| {
        s.lines()
            .map(|l| l.trim().trim_start_matches('#').trim())
            .find(|l| !l.is_empty())
            .map(str::to_string)
    };
    let cleaned = first_line(suggested).map(|l| {
        l.trim_start_matches("Title:")
            .trim()
            .trim_matches(|c| c == '"' || c == '\'' || c == '*')
            .trim()
            .to_string()
    });
    let title = cleaned
        .filter(|t| !t.is_empty())
        .or_else(|| first_line(content))
        .unwrap_or_else(|| "Untitled".to_string());
    truncate_chars(&title, max_chars).trim_end().to_string()
}

/// One element of the model's node array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NodeSpec {
    pub content: Option<String>,
    pub parent_index: Option<usize>,
}

/// Extract the JSON array from a model reply, tolerating prose around it.
pub(crate) fn parse_nodes(reply: &str) -> Result<Vec<NodeSpec>, StepError> {
    let start = reply
        .find('[')
        .ok_or_else(|| StepError::InvalidOutput("no JSON array in reply".into()))?;
    let end = reply
        .rfind(']')
        .filter(|&end| end > start)
        .ok_or_else(|| StepError::InvalidOutput("unterminated JSON array in reply".into()))?;

    let values: Vec<Value> = serde_json::from_str(&reply[start..=end])
        .map_err(|e| StepError::InvalidOutput(format!("malformed node array: {e}")))?;

    Ok(values
        .into_iter()
        .map(|value| {
            let content = match &value {
                Value::String(s) => Some(s.as_str()),
                other => other.get("content").and_then(Value::as_str),
            };
            NodeSpec {
                content: content
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(str::to_string),
                parent_index: value
                    .get("parentIndex")
                    .and_then(Value::as_u64)
                    .and_then(|p| usize::try_from(p).ok()),
            }
        })
        .collect())
}
