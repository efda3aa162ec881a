//! Agent-level streaming events.
//!
//! One `StreamEvent` is one line of the chat wire protocol:
//! - `delta`       - partial text from the model
//! - `tool_result` - a tool call completed
//! - `done`        - the run finished with a final answer
//! - `error`       - the run failed
//!
//! Every run that is not cancelled ends with exactly one `done` or `error`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Partial text from the model.
    Delta { content: String },

    /// A tool call completed (successfully or not).
    ToolResult {
        #[serde(rename = "toolName")]
        tool_name: String,
        #[serde(rename = "toolOutput")]
        tool_output: String,
    },

    /// The run is complete.
    Done { model: String },

    /// The run failed; no further events follow.
    Error {
        #[serde(rename = "error")]
        message: String,
    },
}

impl StreamEvent {
    pub fn delta(content: impl Into<String>) -> Self {
        Self::Delta {
            content: content.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Delta { .. } => "delta",
            Self::ToolResult { .. } => "tool_result",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_match_protocol() {
        let cases = [
            (StreamEvent::delta("Hel"), r#"{"type":"delta","content":"Hel"}"#),
            (
                StreamEvent::ToolResult {
                    tool_name: "list_items".into(),
                    tool_output: "[]".into(),
                },
                r#"{"type":"tool_result","toolName":"list_items","toolOutput":"[]"}"#,
            ),
            (
                StreamEvent::Done {
                    model: "gpt-4o".into(),
                },
                r#"{"type":"done","model":"gpt-4o"}"#,
            ),
            (StreamEvent::error("boom"), r#"{"type":"error","error":"boom"}"#),
        ];
        for (event, wire) in cases {
            assert_eq!(serde_json::to_string(&event).unwrap(), wire);
            assert_eq!(serde_json::from_str::<StreamEvent>(wire).unwrap(), event);
        }
    }

    #[test]
    fn only_done_and_error_are_terminal() {
        assert!(!StreamEvent::delta("x").is_terminal());
        assert!(StreamEvent::error("x").is_terminal());
        assert_eq!(StreamEvent::error("x").event_type(), "error");
    }
}
