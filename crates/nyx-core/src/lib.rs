//! # Nyx Core
//!
//! Graph-backed conversational memory and context assembly for chat
//! assistants.
//!
//! - [`storage`]: the conversation graph (users, messages, reply edges,
//!   summaries) behind the [`storage::GraphStore`] trait, with an in-process
//!   petgraph implementation persisted as JSON snapshots
//! - [`memory`]: the memory store, conversation chain reconstruction,
//!   similarity search, topic segmentation and summarization
//! - [`agent`]: rolling context windows, the tool set and the bounded
//!   tool-calling orchestrator
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nyx_core::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> NyxResult<()> {
//! let graph: Arc<dyn GraphStore> = Arc::new(InMemoryGraphStore::open("nyx-graph.json")?);
//! let memory = MemoryStore::new(
//!     graph.clone(),
//!     Arc::new(HashEmbeddingProvider::default()),
//!     BotIdentity::new("bot", "Nyx"),
//! );
//!
//! memory
//!     .store_user_message(NewUserMessage::new("42", "my order never arrived").in_channel("7"))
//!     .await?;
//!
//! for hit in memory.search("order", 0.3, 5).await? {
//!     println!("{:.2} {}", hit.score, hit.content);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//!   inbound message
//!         │
//!         ▼
//!  ContextAssembler ──► ConversationChainResolver ──► GraphStore
//!         │                                              ▲
//!         ▼                                              │
//!  ToolOrchestrator ──► ToolKit ──► MemoryStore ─────────┘
//!         │
//!         ▼
//!   ChatCompletion
//! ```

#![warn(missing_docs)]

pub mod agent;
pub mod error;
pub mod memory;
pub mod storage;

pub use error::{NyxError, NyxResult};

/// Commonly used types
pub mod prelude {
    pub use crate::agent::{
        detect_declared_name, AgentConfig, ContextAssembler, ContextStore, FallbackReason,
        ToolKit, ToolOrchestrator, TurnOutcome,
    };
    pub use crate::error::{NyxError, NyxResult};
    pub use crate::memory::{
        BotIdentity, CentroidTopicModel, ChainConfig, ChainEntry, ConversationChainResolver,
        ConversationDigester, ConversationSegment, EmbeddingProvider, HashEmbeddingProvider,
        LlmSummarizer, MemoryResult, MemoryStore, MessageRef, NewUserMessage, RawMessage,
        SegmenterConfig, SummarizationCapability, Summarizer, SummaryOutcome, TopicCapability,
        TopicSegmenter,
    };
    pub use crate::storage::{GraphStore, InMemoryGraphStore, MessageId, SummaryNode, UserNode};

    #[cfg(feature = "http")]
    pub use crate::memory::LlmEmbeddingProvider;
}
