//! Scripted providers for tests.
//!
//! Available to this crate's tests and, through the `test-helpers` feature,
//! to tests in downstream crates.

use notegraph_core::error::ProviderError;
use notegraph_core::message::{Message, MessageToolCall};
use notegraph_core::provider::{
    ChunkReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk, Usage,
};
use std::sync::Mutex;

pub const MOCK_MODEL: &str = "mock-model";

/// One scripted model turn.
#[derive(Debug, Clone)]
pub enum Scripted {
    Text(String),
    ToolCalls(Vec<MessageToolCall>),
    Fail(ProviderError),
}

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call returns the next response in the queue. Calls past the end of
/// the script fail with `ProviderError::NotConfigured`. Every request is
/// recorded for inspection.
pub struct ScriptedProvider {
    script: Mutex<Vec<Scripted>>,
    requests: Mutex<Vec<ProviderRequest>>,
    /// When set, text replies are streamed in chunks of this many chars.
    chunk_chars: Option<usize>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Scripted>) -> Self {
        Self {
            script: Mutex::new(script),
            requests: Mutex::new(Vec::new()),
            chunk_chars: None,
        }
    }

    /// A provider that always answers with the given texts, in order.
    pub fn texts(replies: &[&str]) -> Self {
        Self::new(replies.iter().map(|r| Scripted::Text(r.to_string())).collect())
    }

    /// A provider that first requests tool calls, then answers.
    pub fn tool_then_answer(tool_calls: Vec<MessageToolCall>, answer: &str) -> Self {
        Self::new(vec![
            Scripted::ToolCalls(tool_calls),
            Scripted::Text(answer.into()),
        ])
    }

    /// Stream text replies as several deltas instead of one chunk.
    pub fn with_chunked_stream(mut self, chunk_chars: usize) -> Self {
        self.chunk_chars = Some(chunk_chars.max(1));
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let call = requests.len();
        requests.push(request);

        let step = self.script.lock().unwrap().get(call).cloned();
        match step {
            Some(Scripted::Text(text)) => Ok(make_response(Message::assistant(text))),
            Some(Scripted::ToolCalls(calls)) => {
                let mut message = Message::assistant("");
                message.tool_calls = calls;
                Ok(make_response(message))
            }
            Some(Scripted::Fail(e)) => Err(e),
            None => Err(ProviderError::NotConfigured(format!(
                "script exhausted at call #{call}"
            ))),
        }
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.next(request)
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        let response = self.next(request)?;
        let text: Vec<char> = response.message.content.chars().collect();
        let size = self.chunk_chars.unwrap_or(text.len().max(1));
        let pieces: Vec<String> = text.chunks(size).map(|c| c.iter().collect()).collect();

        let (tx, rx) = tokio::sync::mpsc::channel(pieces.len() + 1);
        for piece in pieces {
            let _ = tx
                .send(Ok(StreamChunk {
                    content: Some(piece),
                    ..StreamChunk::default()
                }))
                .await;
        }
        let _ = tx
            .send(Ok(StreamChunk {
                tool_calls: response.message.tool_calls,
                done: true,
                usage: response.usage,
                model: Some(response.model),
                ..StreamChunk::default()
            }))
            .await;
        Ok(rx)
    }
}

/// A provider whose responses never arrive. For cancellation tests.
pub struct StalledProvider;

#[async_trait::async_trait]
impl Provider for StalledProvider {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        std::future::pending().await
    }
}

fn make_response(message: Message) -> ProviderResponse {
    ProviderResponse {
        message,
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: MOCK_MODEL.into(),
    }
}

/// Helper to create a tool call.
pub fn make_tool_call(id: &str, name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments: args.to_string(),
    }
}
