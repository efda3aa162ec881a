//! The notegraph agent: model/tool orchestration for one conversational turn.
//!
//! The agent follows an **Ask → Act → Observe** cycle:
//!
//! 1. **Seed** the conversation with the system prompt (plus resource context)
//! 2. **Ask** the model, streaming its text out as `delta` events
//! 3. **If tool calls**: execute them, append results, loop back to step 2
//! 4. **If text only**: emit `done` with the responding model id
//!
//! The loop ends with a final answer, a failure, a turn-limit error, or
//! cancellation by the caller.

pub mod codec;
pub mod loop_runner;
pub mod resources;
pub mod stream_event;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use codec::{StreamDecoder, StreamEncoder, encode_line};
pub use loop_runner::{AgentLoop, AgentPhase, AgentState, DEFAULT_MAX_TURNS, RunOutcome};
pub use resources::{ResourceRef, build_resource_context, compose_system_prompt};
pub use stream_event::StreamEvent;
