//! # Nyx LLM
//!
//! Minimal client for OpenAI-compatible chat completion servers (LM Studio,
//! Ollama, vLLM, OpenAI itself) with tool calling and embeddings.
//!
//! The crate is split into the wire-agnostic message model ([`ChatMessage`],
//! [`ToolCall`], [`ToolDefinition`]), the [`ChatCompletion`] capability trait
//! that the rest of Nyx programs against, and the HTTP [`Client`] that
//! implements it.
//!
//! ```rust,no_run
//! use nyx_llm::{ChatCompletion, ChatMessage, Client};
//!
//! # async fn example() -> nyx_llm::LlmResult<()> {
//! let client = Client::from_env()?;
//! let response = client
//!     .chat_completion(&[ChatMessage::user("Hello!")])
//!     .await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

#[cfg(feature = "openai")]
mod client;
mod config;
mod error;
mod message;
mod tools;

#[cfg(feature = "openai")]
pub use client::Client;
pub use config::ClientConfig;
pub use error::{LlmError, LlmResult};
pub use message::{ChatMessage, ChatResponse, MessageRole};
pub use tools::{FunctionCall, FunctionDefinition, ToolCall, ToolDefinition};

use async_trait::async_trait;

/// Chat completion capability.
///
/// Implemented by [`Client`] for real backends and by test doubles.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    /// Send a conversation, optionally advertising tools the model may call.
    async fn chat_completion_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[ToolDefinition]>,
    ) -> LlmResult<ChatResponse>;

    /// Send a conversation without tools.
    async fn chat_completion(&self, messages: &[ChatMessage]) -> LlmResult<ChatResponse> {
        self.chat_completion_with_tools(messages, None).await
    }
}
