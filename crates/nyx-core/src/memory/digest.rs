//! Conversation digests: chain → topic segments → stored summaries

use super::chain::{ChainEntry, ConversationChainResolver};
use super::segment::{RawMessage, TopicSegmenter};
use super::store::MemoryStore;
use super::summarize::Summarizer;
use crate::error::NyxResult;
use crate::storage::SummaryNode;
use tracing::{info, warn};

impl From<&ChainEntry> for RawMessage {
    fn from(entry: &ChainEntry) -> Self {
        Self {
            content: Some(entry.content.clone()),
            role: entry.role.as_str().to_string(),
            timestamp: Some(entry.timestamp),
            platform_id: entry.platform_id.clone(),
        }
    }
}

/// Summarizes stored history into ConversationSummary nodes
#[derive(Clone)]
pub struct ConversationDigester {
    memory: MemoryStore,
    resolver: ConversationChainResolver,
    segmenter: TopicSegmenter,
    summarizer: Summarizer,
}

impl ConversationDigester {
    /// Create a digester
    pub fn new(
        memory: MemoryStore,
        resolver: ConversationChainResolver,
        segmenter: TopicSegmenter,
        summarizer: Summarizer,
    ) -> Self {
        Self {
            memory,
            resolver,
            segmenter,
            summarizer,
        }
    }

    /// Digest a user's history newer than their latest stored summary
    pub async fn digest_user(&self, user_id: &str) -> NyxResult<Vec<SummaryNode>> {
        let covered_until = self
            .memory
            .summaries_for_user(user_id)
            .await?
            .iter()
            .map(|s| s.end_time)
            .max();

        let raw: Vec<RawMessage> = self
            .resolver
            .resolve(user_id)
            .await?
            .iter()
            .filter(|entry| covered_until.map_or(true, |until| entry.timestamp > until))
            .map(RawMessage::from)
            .collect();

        self.digest_messages(user_id, raw).await
    }

    /// Segment, summarize and store an arbitrary message batch for a user
    pub async fn digest_messages(
        &self,
        user_id: &str,
        raw: Vec<RawMessage>,
    ) -> NyxResult<Vec<SummaryNode>> {
        let segments = self.segmenter.segment(raw).await;
        let mut stored = Vec::with_capacity(segments.len());

        for mut segment in segments {
            let outcome = self.summarizer.summarize(&mut segment).await;
            if outcome.is_degraded() {
                warn!(user_id, topic = %segment.topic, "Storing degraded summary");
            }
            stored.push(self.memory.store_conversation_summary(user_id, &segment).await?);
        }

        info!(user_id, summaries = stored.len(), "Digested conversation");
        Ok(stored)
    }
}
