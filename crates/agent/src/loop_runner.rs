//! The agent loop state machine.
//!
//! ```text
//!            ┌──────── tool results ────────┐
//!            ▼                              │
//!   ──▶  AGENT ── tool calls ──▶  TOOLS ────┘
//!            │
//!            ├── text only ──▶ DONE   (one `done` event)
//!            └── failure   ──▶ FAILED (one `error` event)
//! ```
//!
//! A run owns its [`AgentState`] and is never shared between requests.
//! Cancellation is checked before every model call and every tool dispatch,
//! and raced against the model stream. A cancelled run emits nothing more.

use crate::stream_event::StreamEvent;
use chrono::Utc;
use futures::future::join_all;
use notegraph_config::AppConfig;
use notegraph_core::error::Error;
use notegraph_core::event::{DomainEvent, EventBus};
use notegraph_core::message::{Conversation, Message, MessageToolCall};
use notegraph_core::progress::{CollectingReporter, ProgressReporter};
use notegraph_core::provider::{Provider, ProviderRequest, ToolDefinition};
use notegraph_core::tool::{ToolCall, ToolRegistry, ToolResult};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default bound on model calls per run.
pub const DEFAULT_MAX_TURNS: u32 = 15;

const STREAM_BUFFER: usize = 128;

/// The in-flight state of one run.
#[derive(Debug)]
pub struct AgentState {
    pub conversation: Conversation,
    pub pending_tool_calls: Vec<ToolCall>,
    pub turns_taken: u32,
}

impl AgentState {
    pub fn new(conversation: Conversation) -> Self {
        Self {
            conversation,
            pending_tool_calls: Vec::new(),
            turns_taken: 0,
        }
    }
}

/// Where the state machine is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentPhase {
    /// Awaiting a model response.
    Agent,
    /// Executing the pending tool calls.
    Tools,
    /// The model produced a final answer.
    Done { model: String },
    /// The run failed.
    Failed(String),
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Done { model: String, reply: String },
    Failed { message: String },
    /// Stopped by the caller. No terminal event was emitted.
    Cancelled,
}

impl RunOutcome {
    fn label(&self) -> &'static str {
        match self {
            RunOutcome::Done { .. } => "done",
            RunOutcome::Failed { .. } => "error",
            RunOutcome::Cancelled => "cancelled",
        }
    }
}

/// The run was cancelled, or its consumer went away.
struct Interrupted;

/// Orchestrates model calls and tool execution for one conversational turn.
#[derive(Clone)]
pub struct AgentLoop {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    tools: Arc<ToolRegistry>,
    max_turns: u32,
    parallel_tools: bool,
    event_bus: Option<Arc<EventBus>>,
}

impl AgentLoop {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            tools,
            max_turns: DEFAULT_MAX_TURNS,
            parallel_tools: true,
            event_bus: None,
        }
    }

    /// Apply temperature, token and loop settings from configuration.
    pub fn with_config(self, config: &AppConfig) -> Self {
        self.with_temperature(config.default_temperature)
            .with_max_tokens(config.default_max_tokens)
            .with_max_turns(config.agent.max_turns)
            .with_parallel_tools(config.agent.parallel_tools)
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Set the maximum number of model calls per run (at least one).
    pub fn with_max_turns(mut self, max: u32) -> Self {
        self.max_turns = max.max(1);
        self
    }

    /// Run the tool calls of one turn concurrently or one by one.
    pub fn with_parallel_tools(mut self, parallel: bool) -> Self {
        self.parallel_tools = parallel;
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Drive one run to completion, reporting events as they happen.
    ///
    /// Unless cancelled, exactly one `done` or `error` event is reported,
    /// and it is the last one.
    pub async fn run(
        &self,
        conversation: Conversation,
        tools_enabled: bool,
        reporter: &dyn ProgressReporter<StreamEvent>,
        cancel: &CancellationToken,
    ) -> RunOutcome {
        info!(
            conversation_id = %conversation.id,
            messages = conversation.len(),
            tools_enabled,
            "Starting agent run"
        );

        let definitions = if tools_enabled {
            self.tools.definitions()
        } else {
            Vec::new()
        };
        let mut state = AgentState::new(conversation);
        let mut phase = AgentPhase::Agent;

        let outcome = loop {
            phase = match phase {
                AgentPhase::Agent => {
                    match self
                        .call_model(&mut state, &definitions, tools_enabled, reporter, cancel)
                        .await
                    {
                        Ok(next) => next,
                        Err(Interrupted) => break RunOutcome::Cancelled,
                    }
                }
                AgentPhase::Tools => match self.run_tools(&mut state, reporter, cancel).await {
                    Ok(()) => AgentPhase::Agent,
                    Err(Interrupted) => break RunOutcome::Cancelled,
                },
                AgentPhase::Done { model } => {
                    let reply = state
                        .conversation
                        .last()
                        .map(|m| m.content.clone())
                        .unwrap_or_default();
                    let _ = reporter
                        .report(StreamEvent::Done {
                            model: model.clone(),
                        })
                        .await;
                    break RunOutcome::Done { model, reply };
                }
                AgentPhase::Failed(message) => {
                    warn!(conversation_id = %state.conversation.id, error = %message, "Agent run failed");
                    let _ = reporter.report(StreamEvent::error(message.clone())).await;
                    break RunOutcome::Failed { message };
                }
            };
        };

        if outcome == RunOutcome::Cancelled {
            info!(
                conversation_id = %state.conversation.id,
                turns = state.turns_taken,
                "Agent run cancelled"
            );
        }
        self.publish(DomainEvent::RunFinished {
            conversation_id: state.conversation.id.to_string(),
            outcome: outcome.label().into(),
            turns: state.turns_taken,
            timestamp: Utc::now(),
        });
        outcome
    }

    /// Spawn a run and return its event stream.
    ///
    /// Dropping the receiver stops the run at its next report.
    pub fn run_stream(
        &self,
        conversation: Conversation,
        tools_enabled: bool,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let agent = self.clone();
        tokio::spawn(async move {
            agent.run(conversation, tools_enabled, &tx, &cancel).await;
        });
        rx
    }

    /// Run with tools disabled and return the reply text.
    pub async fn generate(
        &self,
        conversation: Conversation,
        cancel: &CancellationToken,
    ) -> Result<String, Error> {
        let sink = CollectingReporter::new();
        match self.run(conversation, false, &sink, cancel).await {
            RunOutcome::Done { reply, .. } => Ok(reply),
            RunOutcome::Failed { message } => Err(Error::Aborted(message)),
            RunOutcome::Cancelled => Err(Error::Cancelled),
        }
    }

    /// Single-shot helper: system prompt plus one user message.
    pub async fn prompt(
        &self,
        system: &str,
        user: &str,
        cancel: &CancellationToken,
    ) -> Result<String, Error> {
        let conversation = Conversation::seeded(system, [Message::user(user)]);
        self.generate(conversation, cancel).await
    }

    /// AGENT: one model call, streamed.
    async fn call_model(
        &self,
        state: &mut AgentState,
        definitions: &[ToolDefinition],
        tools_enabled: bool,
        reporter: &dyn ProgressReporter<StreamEvent>,
        cancel: &CancellationToken,
    ) -> Result<AgentPhase, Interrupted> {
        if cancel.is_cancelled() {
            return Err(Interrupted);
        }
        if state.turns_taken >= self.max_turns {
            return Ok(AgentPhase::Failed(format!(
                "agent exceeded {} model calls without a final answer",
                self.max_turns
            )));
        }
        state.turns_taken += 1;
        let turn = state.turns_taken;

        let request = ProviderRequest {
            model: self.model.clone(),
            messages: state.conversation.messages().to_vec(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools: definitions.to_vec(),
        };
        debug!(
            conversation_id = %state.conversation.id,
            turn,
            provider = self.provider.name(),
            "Calling model"
        );

        let mut chunks = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Interrupted),
            result = self.provider.stream(request) => match result {
                Ok(rx) => rx,
                Err(e) => return Ok(AgentPhase::Failed(e.to_string())),
            },
        };

        let mut text = String::new();
        let mut tool_calls: Vec<MessageToolCall> = Vec::new();
        let mut model = None;
        let mut tokens_used = 0;
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Interrupted),
                next = chunks.recv() => next,
            };
            let chunk = match next {
                Some(Ok(chunk)) => chunk,
                Some(Err(e)) => return Ok(AgentPhase::Failed(e.to_string())),
                None => {
                    return Ok(AgentPhase::Failed(
                        "model stream ended before completion".into(),
                    ));
                }
            };

            if let Some(content) = chunk.content.filter(|c| !c.is_empty()) {
                text.push_str(&content);
                reporter
                    .report(StreamEvent::delta(content))
                    .await
                    .map_err(|_| Interrupted)?;
            }
            if !chunk.tool_calls.is_empty() {
                tool_calls = chunk.tool_calls;
            }
            if chunk.model.is_some() {
                model = chunk.model;
            }
            if let Some(usage) = chunk.usage {
                tokens_used = usage.total_tokens;
            }
            if chunk.done {
                break;
            }
        }

        let model = model
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| self.model.clone());
        self.publish(DomainEvent::ModelInvoked {
            conversation_id: state.conversation.id.to_string(),
            model: model.clone(),
            turn,
            tokens_used,
            timestamp: Utc::now(),
        });

        let mut reply = Message::assistant(text);
        if !tools_enabled || tool_calls.is_empty() {
            if !tool_calls.is_empty() {
                debug!(count = tool_calls.len(), "Ignoring tool calls, tools are disabled");
            }
            state.conversation.push(reply);
            return Ok(AgentPhase::Done { model });
        }

        debug!(turn, count = tool_calls.len(), "Model requested tool calls");
        state.pending_tool_calls = tool_calls
            .iter()
            .map(|tc| ToolCall {
                id: tc.id.clone(),
                name: tc.name.clone(),
                arguments: parse_arguments(&tc.arguments),
            })
            .collect();
        reply.tool_calls = tool_calls;
        state.conversation.push(reply);
        Ok(AgentPhase::Tools)
    }

    /// TOOLS: dispatch the pending calls; results follow request order.
    async fn run_tools(
        &self,
        state: &mut AgentState,
        reporter: &dyn ProgressReporter<StreamEvent>,
        cancel: &CancellationToken,
    ) -> Result<(), Interrupted> {
        if cancel.is_cancelled() {
            return Err(Interrupted);
        }
        let calls = std::mem::take(&mut state.pending_tool_calls);

        let dispatch = async {
            if self.parallel_tools {
                join_all(calls.iter().map(|call| self.execute_tool(call))).await
            } else {
                let mut results = Vec::with_capacity(calls.len());
                for call in &calls {
                    results.push(self.execute_tool(call).await);
                }
                results
            }
        };
        let results = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Interrupted),
            results = dispatch => results,
        };

        for (call, result) in calls.iter().zip(results) {
            if cancel.is_cancelled() {
                return Err(Interrupted);
            }
            state.conversation.push(Message::tool_result(
                &call.id,
                result.output.clone(),
                result.is_error,
            ));
            reporter
                .report(StreamEvent::ToolResult {
                    tool_name: call.name.clone(),
                    tool_output: result.output,
                })
                .await
                .map_err(|_| Interrupted)?;
        }
        Ok(())
    }

    async fn execute_tool(&self, call: &ToolCall) -> ToolResult {
        let start = Instant::now();
        let result = self.tools.execute(call).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        if result.is_error {
            debug!(tool = %call.name, duration_ms, output = %result.output, "Tool call failed");
        } else {
            debug!(tool = %call.name, duration_ms, "Tool call succeeded");
        }
        self.publish(DomainEvent::ToolExecuted {
            tool_name: call.name.clone(),
            success: !result.is_error,
            duration_ms,
            timestamp: Utc::now(),
        });
        result
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }
}

/// Model-produced arguments. Empty means no arguments; anything that is not
/// JSON is passed through as a string and rejected by the registry.
fn parse_arguments(raw: &str) -> serde_json::Value {
    if raw.trim().is_empty() {
        return serde_json::Value::Object(serde_json::Map::new());
    }
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{
        make_tool_call, MOCK_MODEL, Scripted, ScriptedProvider, StalledProvider,
    };
    use notegraph_core::error::{ProviderError, ToolError};
    use notegraph_core::message::Role;
    use notegraph_core::tool::Tool;
    use serde_json::json;
    use std::time::Duration;

    /// Sleeps for `ms` milliseconds, then echoes `label`.
    struct SleepyTool;

    #[async_trait::async_trait]
    impl Tool for SleepyTool {
        fn name(&self) -> &str {
            "sleepy"
        }
        fn description(&self) -> &str {
            "Sleeps, then echoes its label"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            json!({
                "type": "object",
                "properties": {"label": {"type": "string"}, "ms": {"type": "integer"}},
                "required": ["label"]
            })
        }
        async fn execute(&self, args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
            let ms = args["ms"].as_u64().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(json!(args["label"].as_str().unwrap_or_default()))
        }
    }

    fn registry() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(SleepyTool)).unwrap();
        Arc::new(registry)
    }

    fn agent(provider: Arc<ScriptedProvider>) -> AgentLoop {
        AgentLoop::new(provider, MOCK_MODEL, registry())
    }

    fn hi() -> Conversation {
        Conversation::seeded("You are helpful.", [Message::user("hi")])
    }

    async fn collect(agent: &AgentLoop, tools: bool, cancel: &CancellationToken) -> (RunOutcome, Vec<StreamEvent>) {
        let sink = CollectingReporter::new();
        let outcome = agent.run(hi(), tools, &sink, cancel).await;
        (outcome, sink.take())
    }

    fn terminal_count(events: &[StreamEvent]) -> usize {
        events.iter().filter(|e| e.is_terminal()).count()
    }

    #[tokio::test]
    async fn deltas_concatenate_to_reply_then_done() {
        let reply = "Hello there, how can I help you today?";
        let provider = Arc::new(ScriptedProvider::texts(&[reply]).with_chunked_stream(4));
        let (outcome, events) = collect(&agent(provider), false, &CancellationToken::new()).await;

        let (last, rest) = events.split_last().unwrap();
        assert_eq!(*last, StreamEvent::Done { model: MOCK_MODEL.into() });
        assert!(rest.len() > 1);
        let text: String = rest
            .iter()
            .map(|e| match e {
                StreamEvent::Delta { content } => content.as_str(),
                other => panic!("unexpected event {other:?}"),
            })
            .collect();
        assert_eq!(text, reply);
        assert_eq!(
            outcome,
            RunOutcome::Done { model: MOCK_MODEL.into(), reply: reply.into() }
        );
    }

    #[tokio::test]
    async fn tools_disabled_means_one_model_call() {
        let provider = Arc::new(ScriptedProvider::tool_then_answer(
            vec![make_tool_call("c1", "sleepy", json!({"label": "x"}))],
            "never reached",
        ));
        let (outcome, events) = collect(&agent(provider.clone()), false, &CancellationToken::new()).await;

        assert_eq!(provider.call_count(), 1);
        assert!(provider.requests()[0].tools.is_empty());
        assert!(matches!(outcome, RunOutcome::Done { .. }));
        assert_eq!(events, vec![StreamEvent::Done { model: MOCK_MODEL.into() }]);
    }

    #[tokio::test]
    async fn tool_results_are_fed_back_to_the_model() {
        let provider = Arc::new(ScriptedProvider::tool_then_answer(
            vec![make_tool_call("c1", "sleepy", json!({"label": "pong"}))],
            "The tool said pong.",
        ));
        let (outcome, events) = collect(&agent(provider.clone()), true, &CancellationToken::new()).await;

        assert_eq!(provider.call_count(), 2);
        assert!(!provider.requests()[0].tools.is_empty());
        let second = &provider.requests()[1].messages;
        let tool_msg = second.last().unwrap();
        assert_eq!(tool_msg.role, Role::Tool);
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some("c1"));
        assert_eq!(tool_msg.content, "pong");

        assert_eq!(
            events[0],
            StreamEvent::ToolResult { tool_name: "sleepy".into(), tool_output: "pong".into() }
        );
        assert_eq!(terminal_count(&events), 1);
        assert!(matches!(outcome, RunOutcome::Done { reply, .. } if reply == "The tool said pong."));
    }

    #[tokio::test]
    async fn tool_errors_are_not_fatal() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Scripted::ToolCalls(vec![
                make_tool_call("c1", "no_such_tool", json!({})),
                make_tool_call("c2", "sleepy", json!({})),
                MessageToolCall { id: "c3".into(), name: "sleepy".into(), arguments: "{not json".into() },
            ]),
            Scripted::Text("Sorry, those failed.".into()),
        ]));
        let (outcome, events) = collect(&agent(provider.clone()), true, &CancellationToken::new()).await;

        assert!(matches!(outcome, RunOutcome::Done { .. }));
        let outputs: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::ToolResult { tool_output, .. } => Some(tool_output.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(outputs.len(), 3);
        assert!(outputs.iter().all(|o| o.starts_with("Error:")));

        let fed_back: Vec<_> = provider.requests()[1]
            .messages
            .iter()
            .filter(|m| m.role == Role::Tool)
            .map(|m| m.is_error)
            .collect();
        assert_eq!(fed_back, vec![true, true, true]);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_results_follow_request_order() {
        for parallel in [true, false] {
            let provider = Arc::new(ScriptedProvider::tool_then_answer(
                vec![
                    make_tool_call("c1", "sleepy", json!({"label": "slow", "ms": 50})),
                    make_tool_call("c2", "sleepy", json!({"label": "fast", "ms": 1})),
                ],
                "done",
            ));
            let agent = agent(provider).with_parallel_tools(parallel);
            let (_, events) = collect(&agent, true, &CancellationToken::new()).await;
            let names: Vec<_> = events
                .iter()
                .filter_map(|e| match e {
                    StreamEvent::ToolResult { tool_output, .. } => Some(tool_output.clone()),
                    _ => None,
                })
                .collect();
            assert_eq!(names, vec!["slow", "fast"], "parallel={parallel}");
        }
    }

    #[tokio::test]
    async fn turn_limit_ends_with_single_error() {
        let looping = vec![make_tool_call("c", "sleepy", json!({"label": "again"}))];
        let provider = Arc::new(ScriptedProvider::new(
            (0..10).map(|_| Scripted::ToolCalls(looping.clone())).collect(),
        ));
        let agent = agent(provider.clone()).with_max_turns(3);
        let (outcome, events) = collect(&agent, true, &CancellationToken::new()).await;

        assert_eq!(provider.call_count(), 3);
        assert!(matches!(&outcome, RunOutcome::Failed { message } if message.contains("3 model calls")));
        assert_eq!(terminal_count(&events), 1);
        assert!(matches!(events.last(), Some(StreamEvent::Error { .. })));
    }

    #[tokio::test]
    async fn provider_failure_is_a_single_error() {
        let provider = Arc::new(ScriptedProvider::new(vec![Scripted::Fail(
            ProviderError::RateLimited { retry_after_secs: 30 },
        )]));
        let (outcome, events) = collect(&agent(provider), true, &CancellationToken::new()).await;

        assert!(matches!(outcome, RunOutcome::Failed { .. }));
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], StreamEvent::Error { message } if message.contains("Rate limited")));
    }

    #[tokio::test]
    async fn cancelled_before_model_call() {
        let provider = Arc::new(ScriptedProvider::texts(&["unused"]));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (outcome, events) = collect(&agent(provider.clone()), true, &cancel).await;

        assert_eq!(outcome, RunOutcome::Cancelled);
        assert_eq!(provider.call_count(), 0);
        assert!(events.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_pending_model_call() {
        let agent = AgentLoop::new(Arc::new(StalledProvider), MOCK_MODEL, registry());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let sink = CollectingReporter::new();
        let outcome = agent.run(hi(), true, &sink, &cancel).await;
        assert_eq!(outcome, RunOutcome::Cancelled);
        assert!(sink.take().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_tools_stops_all_output() {
        for parallel in [true, false] {
            let provider = Arc::new(ScriptedProvider::tool_then_answer(
                vec![
                    make_tool_call("c1", "sleepy", json!({"label": "slow", "ms": 50})),
                    make_tool_call("c2", "sleepy", json!({"label": "slower", "ms": 50})),
                ],
                "never reached",
            ));
            let agent = agent(provider.clone()).with_parallel_tools(parallel);
            let cancel = CancellationToken::new();
            let trigger = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                trigger.cancel();
            });

            let (outcome, events) = collect(&agent, true, &cancel).await;
            assert_eq!(outcome, RunOutcome::Cancelled, "parallel={parallel}");
            assert!(events.is_empty(), "parallel={parallel}: {events:?}");
            assert_eq!(provider.call_count(), 1);
        }
    }

    #[tokio::test]
    async fn closed_consumer_counts_as_cancellation() {
        let provider = Arc::new(ScriptedProvider::texts(&["some reply"]));
        let (tx, rx) = mpsc::channel(4);
        drop(rx);
        let outcome = agent(provider).run(hi(), false, &tx, &CancellationToken::new()).await;
        assert_eq!(outcome, RunOutcome::Cancelled);
    }

    #[tokio::test]
    async fn run_stream_ends_with_terminal_event() {
        let provider = Arc::new(ScriptedProvider::texts(&["streamed"]).with_chunked_stream(3));
        let mut rx = agent(provider).run_stream(hi(), true, CancellationToken::new());

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert_eq!(terminal_count(&events), 1);
        assert!(events.last().unwrap().is_terminal());
    }

    #[tokio::test]
    async fn generate_returns_reply_text() {
        let provider = Arc::new(ScriptedProvider::texts(&["A short answer"]));
        let reply = agent(provider.clone())
            .prompt("Be brief.", "Question?", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(reply, "A short answer");

        let request = &provider.requests()[0];
        assert!(request.tools.is_empty());
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.messages[1].content, "Question?");
    }

    #[tokio::test]
    async fn generate_distinguishes_cancel_from_failure() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let provider = Arc::new(ScriptedProvider::texts(&["unused"]));
        let err = agent(provider).generate(hi(), &cancel).await.unwrap_err();
        assert!(err.is_cancelled());

        let failing = Arc::new(ScriptedProvider::new(vec![]));
        let err = agent(failing)
            .generate(hi(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Aborted(_)));
    }

    #[tokio::test]
    async fn domain_events_are_published() {
        let bus = Arc::new(EventBus::new(16));
        let mut rx = bus.subscribe();
        let provider = Arc::new(ScriptedProvider::tool_then_answer(
            vec![make_tool_call("c1", "sleepy", json!({"label": "x"}))],
            "ok",
        ));
        let agent = agent(provider).with_event_bus(bus);
        collect(&agent, true, &CancellationToken::new()).await;

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(event.kind());
        }
        assert_eq!(
            kinds,
            vec!["model_invoked", "tool_executed", "model_invoked", "run_finished"]
        );
    }

    #[tokio::test]
    async fn domain_tools_mutate_the_store() {
        use notegraph_core::store::{Collection, EntityStore, ListFilter};
        use notegraph_store::InMemoryStore;

        let store = Arc::new(InMemoryStore::new());
        let registry = notegraph_tools::default_registry(store.clone()).unwrap();
        let provider = Arc::new(ScriptedProvider::tool_then_answer(
            vec![make_tool_call(
                "c1",
                "create_item",
                json!({"objectId": "o1", "title": "Ownership", "content": "Each value has one owner."}),
            )],
            "Created it.",
        ));
        let agent = AgentLoop::new(provider, MOCK_MODEL, Arc::new(registry));
        let (outcome, _) = collect(&agent, true, &CancellationToken::new()).await;

        assert!(matches!(outcome, RunOutcome::Done { .. }));
        let items = store.list(Collection::Items, &ListFilter::eq("objectId", "o1")).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].str_field("title"), Some("Ownership"));
    }

    #[test]
    fn argument_parsing() {
        assert_eq!(parse_arguments(""), json!({}));
        assert_eq!(parse_arguments(r#"{"a":1}"#), json!({"a": 1}));
        assert_eq!(parse_arguments("oops"), json!("oops"));
    }

    #[test]
    fn config_is_applied() {
        let mut config = AppConfig::default();
        config.agent.max_turns = 4;
        config.agent.parallel_tools = false;
        let agent = agent(Arc::new(ScriptedProvider::texts(&[]))).with_config(&config);
        assert_eq!(agent.max_turns, 4);
        assert!(!agent.parallel_tools);
        assert_eq!(agent.max_tokens, Some(config.default_max_tokens));
    }
}
