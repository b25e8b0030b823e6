//! Wiring of the memory engine, agent and bot from a [`NyxConfig`]

use crate::bot::Bot;
use crate::config::NyxConfig;
use nyx_core::agent::{ContextAssembler, ContextStore, ToolKit, ToolOrchestrator};
use nyx_core::memory::{
    CentroidTopicModel, ConversationChainResolver, ConversationDigester, EmbeddingProvider,
    HashEmbeddingProvider, LlmSummarizer, MemoryStore, Summarizer, TopicSegmenter,
};
use nyx_core::storage::{GraphStore, InMemoryGraphStore};
use nyx_llm::ChatCompletion;
use std::sync::Arc;

/// Every long-lived component of a running assistant
pub struct Runtime {
    /// Loaded configuration
    pub config: NyxConfig,
    /// Graph-backed memory
    pub memory: MemoryStore,
    /// Message handler
    pub bot: Arc<Bot>,
    /// Segment-and-summarize pipeline
    pub digester: ConversationDigester,
}

impl Runtime {
    /// Assemble a runtime over explicit capabilities
    pub fn build(
        config: NyxConfig,
        llm: Arc<dyn ChatCompletion>,
        graph: Arc<dyn GraphStore>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        let agent = config.agent();
        let memory = MemoryStore::new(graph.clone(), embedder, config.identity())
            .with_embed_timeout(config.capability_timeout());

        let resolver = ConversationChainResolver::new(graph, config.chain());
        let assembler = ContextAssembler::new(
            Arc::new(ContextStore::new(agent.window_size, agent.max_conversations)),
            resolver.clone(),
            agent.clone(),
        );
        let tools = ToolKit::new(memory.clone(), agent.clone());
        let orchestrator = ToolOrchestrator::new(llm.clone(), assembler, tools, agent);
        let bot = Arc::new(Bot::new(memory.clone(), orchestrator, config.access()));

        let segmenter = TopicSegmenter::new(Arc::new(CentroidTopicModel::default()), config.segmenter());
        let summarizer =
            Summarizer::new(Arc::new(LlmSummarizer::new(llm))).with_timeout(config.capability_timeout());
        let digester = ConversationDigester::new(memory.clone(), resolver, segmenter, summarizer);

        Self {
            config,
            memory,
            bot,
            digester,
        }
    }

    /// Connect to the configured server and open the graph snapshot
    #[cfg(feature = "http")]
    pub fn connect(config: NyxConfig) -> nyx_core::NyxResult<Self> {
        use crate::config::EmbeddingBackend;
        use nyx_core::memory::LlmEmbeddingProvider;
        use tracing::info;

        let client = Arc::new(
            nyx_llm::Client::new(config.client())
                .map_err(|e| nyx_core::NyxError::llm("connect", e))?,
        );
        let graph = Arc::new(InMemoryGraphStore::open(config.store_path.clone())?);
        info!(
            base_url = %config.base_url,
            model = %config.model,
            store = %config.store_path.display(),
            messages = graph.message_count(),
            "Runtime ready"
        );

        let embedder: Arc<dyn EmbeddingProvider> = match config.embedding_backend {
            EmbeddingBackend::Http => {
                Arc::new(LlmEmbeddingProvider::new(client.clone(), config.embedding_dimensions))
            }
            EmbeddingBackend::Hash => Arc::new(HashEmbeddingProvider::new(config.embedding_dimensions)),
        };

        Ok(Self::build(config, client, graph, embedder))
    }

    /// In-memory runtime with offline embeddings
    pub fn offline(config: NyxConfig, llm: Arc<dyn ChatCompletion>) -> Self {
        let embedder = Arc::new(HashEmbeddingProvider::new(config.embedding_dimensions));
        Self::build(config, llm, Arc::new(InMemoryGraphStore::new()), embedder)
    }
}
