//! # notegraph Core
//!
//! Domain types, traits, and error definitions for the notegraph
//! orchestration runtime. This crate has **no framework dependencies**: it
//! defines the model that every other crate implements against.
//!
//! ## Layout
//!
//! Every collaborator of the orchestrator is a trait here:
//! - [`Provider`] - the uniform model adapter
//! - [`Tool`] / [`ToolRegistry`] - the closed table of callable capabilities
//! - [`EntityStore`] - the external key-value store holding domain entities
//! - [`ProgressReporter`] - the ordered outward event sink
//!
//! Implementations live in their respective crates.

pub mod error;
pub mod event;
pub mod message;
pub mod principal;
pub mod progress;
pub mod provider;
pub mod store;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus};
pub use message::{Conversation, ConversationId, Message, MessageToolCall, Role};
pub use principal::Principal;
pub use progress::{CallbackReporter, CollectingReporter, ProgressReporter, ReporterClosed};
pub use provider::{Provider, ProviderRequest, ProviderResponse, StreamChunk, ToolDefinition};
pub use store::{Collection, EntityStore, ListFilter, Record};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult};
