//! # Nyx
//!
//! A chat assistant runtime with long-lived, graph-backed memory.
//!
//! Nyx remembers every exchange as a graph of users, messages and reply
//! edges, rebuilds a linear history from it when a conversation resumes,
//! retrieves related past messages on demand through tool calls and
//! condenses old conversations into topic summaries.
//!
//! ## Crates
//!
//! - [`engine`] (`nyx-core`): graph storage, memory engine, context assembly
//!   and the tool-calling orchestrator
//! - [`llm`] (`nyx-llm`): OpenAI-compatible chat completion and embedding
//!   client
//!
//! This crate adds the runtime around them: configuration, the access
//! policy, the single-consumer event queue and the console platform.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nyx::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = NyxConfig::load("nyx.yaml")?;
//!     let runtime = Runtime::connect(config)?;
//!
//!     let platform = Arc::new(ConsolePlatform::new("Nyx"));
//!     let (queue, worker) = runtime.bot.clone().spawn(platform);
//!     queue.push(InboundMessage::new("console", "42", "my name is Alex").direct());
//!
//!     drop(queue);
//!     worker.await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! `nyx.yaml` (optional) and `NYX_*` environment variables, see
//! [`config::NyxConfig`].

#![doc(html_root_url = "https://docs.rs/nyx/0.1.0")]
#![warn(missing_docs)]

pub mod bot;
pub mod config;
pub mod console;
pub mod runtime;

// Re-export sub-crates
pub use nyx_core as engine;
pub use nyx_llm as llm;

/// Commonly used types and traits
pub mod prelude {
    pub use crate::bot::{AccessPolicy, Bot, ChatPlatform, EventQueue, InboundMessage, PlatformError};
    pub use crate::config::{ConfigError, NyxConfig};
    pub use crate::console::ConsolePlatform;
    pub use crate::runtime::Runtime;

    pub use nyx_core::prelude::*;
    pub use nyx_llm::{ChatCompletion, ChatMessage, ChatResponse, MessageRole};

    #[cfg(feature = "http")]
    pub use nyx_llm::Client;
}
