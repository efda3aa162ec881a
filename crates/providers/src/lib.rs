//! LLM Provider implementations for notegraph.
//!
//! All providers implement the `notegraph_core::Provider` trait.
//! The router selects the correct provider for each request.

pub mod anthropic;
pub mod openai_compat;
pub mod router;

pub use anthropic::AnthropicProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use router::{ProviderRouter, build_from_config};
