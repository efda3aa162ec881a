//! HTTP API v1.
//!
//! Endpoints:
//!
//! - `POST /v1/chat`                 - Run the agent, stream NDJSON events
//! - `GET  /v1/tools`                - List available tools
//! - `GET  /v1/workflows`            - List stored workflows
//! - `POST /v1/workflows`            - Validate and store a workflow
//! - `GET  /v1/workflows/{id}`       - Get a stored workflow
//! - `POST /v1/workflows/{id}/run`   - Run a workflow, stream NDJSON progress
//! - `GET  /v1/events`               - SSE feed of domain events

use axum::{
    Extension, Router,
    body::{Body, Bytes},
    extract::{Path, State},
    http::{StatusCode, header},
    response::sse::{Event as SseEvent, Sse},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::{BroadcastStream, ReceiverStream};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use notegraph_agent::{ResourceRef, compose_system_prompt, encode_line};
use notegraph_core::message::{Conversation, Message, Role};
use notegraph_core::principal::Principal;
use notegraph_core::progress::{ProgressReporter, ReporterClosed};
use notegraph_core::store::{Collection, ListFilter};
use notegraph_workflow::{ExecutionContext, RunStatus, Scope, StepProgress, Workflow};

use crate::SharedState;
use crate::error::ApiError;

const NDJSON_CONTENT_TYPE: &str = "text/plain; charset=utf-8";
const RUN_LINE_BUFFER: usize = 64;

// ── Router ────────────────────────────────────────────────────────────────

/// Build the v1 API router. Nest this under "/v1" in the main router.
pub fn v1_router(state: SharedState) -> Router {
    Router::new()
        .route("/chat", post(chat_handler))
        .route("/tools", get(list_tools_handler))
        .route("/workflows", get(list_workflows_handler).post(create_workflow_handler))
        .route("/workflows/{id}", get(get_workflow_handler))
        .route("/workflows/{id}/run", post(run_workflow_handler))
        .route("/events", get(events_handler))
        .with_state(state)
}

/// Turn a stream of serializable events into an NDJSON response body.
///
/// The token is cancelled when the body is dropped, i.e. when the client
/// goes away or the stream has been fully sent.
fn ndjson_response<T>(rx: mpsc::Receiver<T>, cancel: CancellationToken) -> Response
where
    T: Serialize + Send + 'static,
{
    let guard = cancel.drop_guard();
    let stream = ReceiverStream::new(rx).map(move |event| {
        let _guard = &guard;
        encode_line(&event)
    });
    (
        [(header::CONTENT_TYPE, NDJSON_CONTENT_TYPE)],
        Body::from_stream(stream),
    )
        .into_response()
}

// ── Chat ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub enable_tools: bool,
    #[serde(default)]
    pub resources: Vec<ResourceRef>,
}

async fn chat_handler(
    State(state): State<SharedState>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    if payload.messages.is_empty() {
        return Err(ApiError::bad_request("messages must not be empty"));
    }

    let agent = state.agent_for(
        payload.provider.as_deref(),
        payload.model.as_deref(),
        payload.api_key.as_deref(),
    )?;
    info!(
        principal = %principal,
        model = agent.model(),
        messages = payload.messages.len(),
        resources = payload.resources.len(),
        tools = payload.enable_tools,
        "v1/chat request"
    );

    let base = payload
        .system_prompt
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .unwrap_or(state.config.agent.system_prompt.as_str());
    let system = compose_system_prompt(base, &payload.resources, state.config.resources.budget_chars);
    let conversation = Conversation::seeded(
        &system,
        payload
            .messages
            .into_iter()
            .map(|m| Message::with(m.role, m.content)),
    );

    let cancel = CancellationToken::new();
    let rx = agent.run_stream(conversation, payload.enable_tools, cancel.clone());
    Ok(ndjson_response(rx, cancel))
}

// ── Tools ─────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ToolDto {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Serialize)]
struct ToolListResponse {
    tools: Vec<ToolDto>,
    count: usize,
}

async fn list_tools_handler(State(state): State<SharedState>) -> Json<ToolListResponse> {
    let mut defs = state.tools.definitions();
    defs.sort_by(|a, b| a.name.cmp(&b.name));
    let count = defs.len();

    Json(ToolListResponse {
        tools: defs
            .into_iter()
            .map(|d| ToolDto {
                name: d.name,
                description: d.description,
                parameters: d.parameters,
            })
            .collect(),
        count,
    })
}

// ── Workflows ─────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct WorkflowListResponse {
    workflows: Vec<Workflow>,
    count: usize,
}

async fn list_workflows_handler(
    State(state): State<SharedState>,
) -> Result<Json<WorkflowListResponse>, ApiError> {
    let records = state
        .store
        .list(Collection::Workflows, &ListFilter::all())
        .await?;
    let workflows: Vec<Workflow> = records
        .iter()
        .filter_map(|record| match Workflow::from_record(record) {
            Ok(wf) => Some(wf),
            Err(e) => {
                warn!(id = %record.id, error = %e, "Skipping unreadable workflow record");
                None
            }
        })
        .collect();
    let count = workflows.len();
    Ok(Json(WorkflowListResponse { workflows, count }))
}

async fn create_workflow_handler(
    State(state): State<SharedState>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<Workflow>,
) -> Result<(StatusCode, Json<Workflow>), ApiError> {
    let problems = payload.validate();
    if !problems.is_empty() {
        return Err(ApiError::unprocessable(problems.join("; ")));
    }

    let record = state
        .store
        .create(Collection::Workflows, payload.to_data())
        .await?;
    let workflow = Workflow::from_record(&record)
        .map_err(|e| ApiError::internal(format!("stored workflow unreadable: {e}")))?;
    info!(id = %workflow.id, name = %workflow.name, principal = %principal, "Workflow created");
    Ok((StatusCode::CREATED, Json(workflow)))
}

async fn load_workflow(state: &SharedState, id: &str) -> Result<Workflow, ApiError> {
    let record = state
        .store
        .get(Collection::Workflows, id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("workflow not found: {id}")))?;
    Workflow::from_record(&record)
        .map_err(|e| ApiError::internal(format!("stored workflow unreadable: {e}")))
}

async fn get_workflow_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Workflow>, ApiError> {
    Ok(Json(load_workflow(&state, &id).await?))
}

/// Optional body of a run request.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub workspace_id: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

/// One line of a workflow run stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunLine {
    Progress(StepProgress),
    Finished {
        status: RunStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<String>,
    },
}

/// Forwards step progress into the response stream.
struct LineReporter(mpsc::Sender<RunLine>);

#[async_trait::async_trait]
impl ProgressReporter<StepProgress> for LineReporter {
    async fn report(&self, event: StepProgress) -> Result<(), ReporterClosed> {
        self.0
            .send(RunLine::Progress(event))
            .await
            .map_err(|_| ReporterClosed)
    }
}

async fn run_workflow_handler(
    State(state): State<SharedState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: RunRequest = if body.iter().all(u8::is_ascii_whitespace) {
        RunRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::bad_request(format!("invalid run request: {e}")))?
    };

    let workflow = load_workflow(&state, &id).await?;
    let agent = state.agent_for(
        request.provider.as_deref(),
        request.model.as_deref(),
        request.api_key.as_deref(),
    )?;

    let cancel = CancellationToken::new();
    let ctx = ExecutionContext::new(state.store.clone(), Arc::new(agent))
        .with_scope(Scope::new(request.project_id, request.workspace_id))
        .with_principal(principal)
        .with_cancel(cancel.clone())
        .with_title_max_chars(state.config.workflow.title_max_chars);

    let (tx, rx) = mpsc::channel(RUN_LINE_BUFFER);
    tokio::spawn(async move {
        let reporter = LineReporter(tx);
        let run = state.engine.run(&workflow, &ctx, &reporter).await;
        let finished = RunLine::Finished {
            status: run.status,
            output: run.output,
        };
        if reporter.0.send(finished).await.is_err() {
            info!(workflow_id = %workflow.id, "Run finished after client disconnected");
        }
    });

    Ok(ndjson_response(rx, cancel))
}

// ── Events ────────────────────────────────────────────────────────────────

async fn events_handler(
    State(state): State<SharedState>,
) -> Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = state.event_bus.subscribe();
    let stream = BroadcastStream::new(rx)
        .filter_map(|result| result.ok())
        .map(|event| {
            let data = serde_json::to_string(event.as_ref()).unwrap_or_default();
            Ok(SseEvent::default().event(event.kind()).data(data))
        });

    Sse::new(stream)
}
