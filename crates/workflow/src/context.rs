//! Everything a step handler may touch, passed explicitly.

use notegraph_agent::AgentLoop;
use notegraph_core::error::{Error, StoreError};
use notegraph_core::principal::Principal;
use notegraph_core::store::EntityStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Default cap on generated item titles.
pub const DEFAULT_TITLE_MAX_CHARS: usize = 60;

/// The project/workspace a run is working in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope {
    pub project_id: Option<String>,
    pub workspace_id: Option<String>,
}

impl Scope {
    pub fn new(project_id: Option<String>, workspace_id: Option<String>) -> Self {
        Self {
            project_id: project_id.filter(|s| !s.is_empty()),
            workspace_id: workspace_id.filter(|s| !s.is_empty()),
        }
    }
}

pub struct ExecutionContext {
    pub store: Arc<dyn EntityStore>,
    pub agent: Arc<AgentLoop>,
    pub scope: Scope,
    pub principal: Principal,
    pub cancel: CancellationToken,
    pub title_max_chars: usize,
}

impl ExecutionContext {
    pub fn new(store: Arc<dyn EntityStore>, agent: Arc<AgentLoop>) -> Self {
        Self {
            store,
            agent,
            scope: Scope::default(),
            principal: Principal::anonymous(),
            cancel: CancellationToken::new(),
            title_max_chars: DEFAULT_TITLE_MAX_CHARS,
        }
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_principal(mut self, principal: Principal) -> Self {
        self.principal = principal;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_title_max_chars(mut self, max: usize) -> Self {
        self.title_max_chars = max.max(1);
        self
    }
}

/// Why a step failed.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("{step_type} step requires config '{key}'")]
    MissingConfig { step_type: &'static str, key: &'static str },

    #[error("{0}")]
    InvalidConfig(String),

    #[error("{0}")]
    MissingInput(String),

    #[error("no {0} in scope for this run")]
    NoScope(&'static str),

    #[error("model call failed: {0}")]
    Model(String),

    #[error("model output could not be used: {0}")]
    InvalidOutput(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("cancelled")]
    Cancelled,
}

impl From<Error> for StepError {
    fn from(e: Error) -> Self {
        match e {
            Error::Cancelled => StepError::Cancelled,
            Error::Store(e) => StepError::Store(e),
            Error::Aborted(message) => StepError::Model(message),
            other => StepError::Model(other.to_string()),
        }
    }
}
