//! # Conversational memory
//!
//! Everything that reads or derives from the conversation graph:
//!
//! - [`MemoryStore`]: the only writer of the graph, plus similarity search
//! - [`ConversationChainResolver`]: linear history from the reply forest
//! - [`TopicSegmenter`]: topic-shift segmentation over TF-IDF vectors
//! - [`Summarizer`]: length-controlled segment summaries with fallbacks
//! - [`ConversationDigester`]: chain → segments → stored summaries
//!
//! Capabilities (embeddings, topics, summarization) are traits so that
//! remote models and local heuristics plug in the same way.

pub mod chain;
pub mod digest;
pub mod segment;
pub mod store;
pub mod summarize;
pub mod tfidf;
pub mod topic;
pub mod vector;

pub use chain::{ChainConfig, ChainEntry, ConversationChainResolver};
pub use digest::ConversationDigester;
pub use segment::{ConversationSegment, RawMessage, SegmentMessage, SegmenterConfig, TopicSegmenter};
pub use store::{BotIdentity, MemoryResult, MemoryStore, MessageRef, NewUserMessage};
pub use summarize::{LlmSummarizer, SummarizationCapability, Summarizer, SummaryOutcome};
pub use tfidf::{TermMatrix, TfIdfVectorizer};
pub use topic::{CentroidTopicModel, TopicAssignment, TopicCapability};
pub use vector::{cosine_similarity, Embedding, EmbeddingProvider, HashEmbeddingProvider, SearchResult};

#[cfg(feature = "http")]
pub use vector::LlmEmbeddingProvider;
