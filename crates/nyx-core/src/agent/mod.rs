//! # Agent layer
//!
//! Turns an inbound message into a model reply:
//!
//! 1. [`ContextAssembler`] seeds the conversation window from memory and
//!    builds the prompt (system, window, user message).
//! 2. [`ToolOrchestrator`] exchanges turns with the chat completion backend,
//!    running [`ToolKit`] calls until the model answers or the turn bound
//!    is hit.
//!
//! ```rust,ignore
//! use nyx_core::agent::{AgentConfig, ToolOrchestrator};
//!
//! let outcome = orchestrator.respond("channel-7", "user-42", "what did we decide?").await;
//! println!("{}", outcome.text());
//! ```

mod config;
mod context;
mod names;
mod orchestrator;
mod tools;

pub use config::AgentConfig;
pub use context::{ContextAssembler, ContextStore, ContextWindow};
pub use names::detect_declared_name;
pub use orchestrator::{
    FallbackReason, ToolOrchestrator, TurnOutcome, TurnState, LLM_FAILURE_MESSAGE,
    TURN_LIMIT_MESSAGE,
};
pub use tools::{tool_definitions, ToolKit, ToolRequest, GET_CURRENT_TIME, SEARCH_MEMORIES};
