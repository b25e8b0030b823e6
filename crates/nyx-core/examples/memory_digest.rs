//! # Memory Digest Demo
//!
//! Walks through the memory engine without any model server:
//!
//! 1. Store a short threaded conversation in the graph
//! 2. Rebuild the conversation chain for one user
//! 3. Search stored messages by similarity
//! 4. Segment the chain by topic, summarize and store the summaries
//!
//! ## Run This Example
//!
//! ```bash
//! cargo run -p nyx-core --example memory_digest
//! ```

use async_trait::async_trait;
use chrono::{Duration, Utc};
use nyx_core::memory::{
    BotIdentity, CentroidTopicModel, ChainConfig, ConversationChainResolver, ConversationDigester,
    HashEmbeddingProvider, MemoryStore, NewUserMessage, SegmenterConfig, SummarizationCapability,
    Summarizer, TopicSegmenter,
};
use nyx_core::storage::InMemoryGraphStore;
use nyx_core::NyxResult;
use std::sync::Arc;
use tracing::info;

/// Keeps the first `min_len` words; stands in for a real summarization model
struct LeadWords;

#[async_trait]
impl SummarizationCapability for LeadWords {
    async fn summarize(&self, text: &str, _max_len: usize, min_len: usize) -> NyxResult<String> {
        Ok(text.split_whitespace().take(min_len).collect::<Vec<_>>().join(" "))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    info!("=== Memory Digest Demo ===\n");

    let graph = Arc::new(InMemoryGraphStore::new());
    let memory = MemoryStore::new(
        graph.clone(),
        Arc::new(HashEmbeddingProvider::default()),
        BotIdentity::new("nyx", "Nyx"),
    );

    // ========================================
    // 1. STORE A THREAD
    // ========================================
    info!("--- 1. Storing messages ---");
    let start = Utc::now() - Duration::hours(2);
    let lines = [
        ("m-1", None, "my order 1182 still has not shipped, can you check the order status"),
        ("m-2", Some("m-1"), "the order status page says the shipment is waiting for stock"),
        ("m-3", Some("m-2"), "also my rust build fails with a linker error on the release profile"),
        ("m-4", Some("m-3"), "the linker error appears when lto is enabled in the release build"),
    ];
    for (i, (id, reply_to, text)) in lines.iter().enumerate() {
        let mut new = NewUserMessage::new("42", *text)
            .with_username("alex")
            .with_platform_id(*id)
            .in_channel("7")
            .at(start + Duration::minutes(i as i64));
        if let Some(parent) = reply_to {
            new = new.replying_to(*parent);
        }
        let stored = memory.store_user_message(new).await?;
        info!("stored {} as {}", id, stored.id);
    }

    // ========================================
    // 2. CONVERSATION CHAIN
    // ========================================
    info!("\n--- 2. Conversation chain ---");
    let resolver = ConversationChainResolver::new(graph.clone(), ChainConfig::default());
    for entry in resolver.resolve("42").await? {
        info!("[{}] {}: {}", entry.timestamp.format("%H:%M"), entry.role, entry.content);
    }

    // ========================================
    // 3. SIMILARITY SEARCH
    // ========================================
    info!("\n--- 3. Search ---");
    for hit in memory.search("linker error in release build", 0.2, 3).await? {
        info!("{:.3}  {}", hit.score, hit.content);
    }

    // ========================================
    // 4. DIGEST
    // ========================================
    info!("\n--- 4. Digest ---");
    let digester = ConversationDigester::new(
        memory.clone(),
        resolver,
        TopicSegmenter::new(Arc::new(CentroidTopicModel::new(2)), SegmenterConfig::default()),
        Summarizer::new(Arc::new(LeadWords)),
    );
    for summary in digester.digest_user("42").await? {
        info!("topic '{}': {}", summary.topic, summary.summary);
    }

    info!("\n=== Demo Complete ===");
    Ok(())
}
