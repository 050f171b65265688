//! The Switchyard agent loop — the heart of the runtime.
//!
//! The agent follows a **think → plan → act → observe** cycle:
//!
//! 1. **Receive** a user message and session handle
//! 2. **Build context** (system prompt + recalled memories + trimmed history)
//! 3. **Stream the LLM**, emitting `content` events as text arrives
//! 4. **If tool calls**: dispatch each (built-ins inline, others through the
//!    skill registry), append observations, loop back to step 3
//! 5. **If text only**: emit the `answer` and finish
//!
//! The loop continues until the LLM responds with text only or the
//! iteration cap is reached.

pub mod accumulator;
pub mod builtins;
pub mod context;
pub mod loop_runner;
pub mod title;

pub use accumulator::ToolCallAccumulator;
pub use context::{estimate_message_tokens, estimate_tokens, ContextManager};
pub use loop_runner::{Agent, RunOptions};
pub use title::{TitleGenerator, FALLBACK_TITLE};
