//! Domain event system: decoupled observation of runs.
//!
//! The agent loop and workflow engine publish events here; the gateway
//! forwards them to `/v1/events` subscribers. Publishing never blocks and
//! never fails, so runs behave the same with or without listeners.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomainEvent {
    /// A model call completed
    ModelInvoked {
        conversation_id: String,
        model: String,
        turn: u32,
        tokens_used: u32,
        timestamp: DateTime<Utc>,
    },

    /// A tool was executed
    ToolExecuted {
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// An agent run reached a terminal state ("done", "error", "cancelled")
    RunFinished {
        conversation_id: String,
        outcome: String,
        turns: u32,
        timestamp: DateTime<Utc>,
    },

    /// A workflow step reached a terminal status
    StepFinished {
        workflow_id: String,
        step_id: String,
        status: String,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    /// Short name used as the SSE event type.
    pub fn kind(&self) -> &'static str {
        match self {
            DomainEvent::ModelInvoked { .. } => "model_invoked",
            DomainEvent::ToolExecuted { .. } => "tool_executed",
            DomainEvent::RunFinished { .. } => "run_finished",
            DomainEvent::StepFinished { .. } => "step_finished",
        }
    }
}

/// A broadcast-based event bus for domain events.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
