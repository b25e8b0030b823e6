//! Conversation chain reconstruction
//!
//! Starts from a user's most recent messages and walks REPLIES_TO edges in
//! both directions, breadth first, up to `max_hops` away from any seed. A
//! seen-id set makes duplicate reply references harmless; the hop bound
//! keeps the walk finite on arbitrarily deep threads.

use crate::error::NyxResult;
use crate::storage::{GraphStore, MessageId, StoredMessage};
use chrono::{DateTime, Utc};
use nyx_llm::{ChatMessage, MessageRole};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::debug;

/// Traversal bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Maximum REPLIES_TO hops from a seed message
    pub max_hops: usize,

    /// Maximum number of entries returned (most recent kept)
    pub limit: usize,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            max_hops: 50,
            limit: 200,
        }
    }
}

/// One message of a reconstructed conversation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainEntry {
    /// Message id
    pub message_id: MessageId,

    /// Text
    pub content: String,

    /// Send time
    pub timestamp: DateTime<Utc>,

    /// `assistant` for bot messages, `user` otherwise
    pub role: MessageRole,

    /// Sender id
    pub sender_id: String,

    /// Sender display name (known name when declared)
    pub sender_name: String,

    /// Platform message id, if bound
    pub platform_id: Option<String>,
}

impl ChainEntry {
    /// Chat message form used to seed context windows
    pub fn to_chat_message(&self) -> ChatMessage {
        match self.role {
            MessageRole::Assistant => ChatMessage::assistant(&self.content),
            _ => ChatMessage::user(&self.content),
        }
    }
}

impl From<StoredMessage> for ChainEntry {
    fn from(stored: StoredMessage) -> Self {
        let role = if stored.sender.is_bot {
            MessageRole::Assistant
        } else {
            MessageRole::User
        };
        Self {
            message_id: stored.message.id,
            content: stored.message.content,
            timestamp: stored.message.timestamp,
            role,
            sender_name: stored.sender.known_name.unwrap_or(stored.sender.username),
            sender_id: stored.sender.id,
            platform_id: stored.message.platform_id,
        }
    }
}

/// Rebuilds a user's conversation from the reply forest
#[derive(Clone)]
pub struct ConversationChainResolver {
    graph: Arc<dyn GraphStore>,
    config: ChainConfig,
}

impl ConversationChainResolver {
    /// Resolver over a graph backend
    pub fn new(graph: Arc<dyn GraphStore>, config: ChainConfig) -> Self {
        Self { graph, config }
    }

    /// Traversal bounds in use
    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Time-ordered, deduplicated history reachable from the user's messages
    pub async fn resolve(&self, user_id: &str) -> NyxResult<Vec<ChainEntry>> {
        let seeds = self
            .graph
            .recent_messages_by_user(user_id, self.config.limit)
            .await?;

        let mut seen: HashSet<MessageId> = HashSet::with_capacity(seeds.len());
        let mut queue: VecDeque<(StoredMessage, usize)> = VecDeque::new();
        for seed in seeds {
            if seen.insert(seed.message.id) {
                queue.push_back((seed, 0));
            }
        }

        let mut collected = Vec::with_capacity(queue.len());
        while let Some((current, depth)) = queue.pop_front() {
            if depth < self.config.max_hops {
                for neighbor in self.graph.reply_neighbors(current.message.id).await? {
                    if seen.insert(neighbor.message.id) {
                        queue.push_back((neighbor, depth + 1));
                    }
                }
            }
            collected.push(current);
        }

        collected.sort_by(|a, b| {
            a.message
                .timestamp
                .cmp(&b.message.timestamp)
                .then_with(|| a.message.id.cmp(&b.message.id))
        });
        if collected.len() > self.config.limit {
            let excess = collected.len() - self.config.limit;
            collected.drain(..excess);
        }

        debug!(user_id, entries = collected.len(), "Resolved conversation chain");
        Ok(collected.into_iter().map(ChainEntry::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{InMemoryGraphStore, MessageKind, MessageNode, Transaction, WriteOp};
    use chrono::TimeZone;

    fn node(secs: i64) -> MessageNode {
        MessageNode {
            id: MessageId::new(),
            content: format!("message at {secs}"),
            embedding: vec![1.0],
            timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
            kind: MessageKind::User,
            platform_id: None,
            channel_id: None,
        }
    }

    fn user(id: &str, is_bot: bool) -> WriteOp {
        WriteOp::UpsertUser {
            id: id.into(),
            username: None,
            is_bot,
            seen_at: Utc.timestamp_opt(0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_hop_bound_limits_expansion() {
        let graph = Arc::new(InMemoryGraphStore::new());
        // 42 sent the root; a bot thread of 5 replies hangs off it.
        let nodes: Vec<MessageNode> = (0..6).map(node).collect();
        let mut tx = Transaction::new().with(user("42", false)).with(user("bot", true));
        for (i, n) in nodes.iter().enumerate() {
            let sender = if i == 0 { "42" } else { "bot" };
            tx.push(WriteOp::CreateMessage { message: n.clone(), sender_id: sender.into() });
        }
        for pair in nodes.windows(2) {
            tx.push(WriteOp::LinkReply { from: pair[1].id, to: pair[0].id });
        }
        graph.apply(tx).await.unwrap();

        let shallow = ConversationChainResolver::new(graph.clone(), ChainConfig { max_hops: 2, limit: 200 });
        assert_eq!(shallow.resolve("42").await.unwrap().len(), 3);

        let deep = ConversationChainResolver::new(graph, ChainConfig::default());
        let chain = deep.resolve("42").await.unwrap();
        assert_eq!(chain.len(), 6);
        assert_eq!(chain[0].role, MessageRole::User);
        assert!(chain[1..].iter().all(|e| e.role == MessageRole::Assistant));
    }

    #[tokio::test]
    async fn test_limit_keeps_most_recent() {
        let graph = Arc::new(InMemoryGraphStore::new());
        let nodes: Vec<MessageNode> = (0..5).map(node).collect();
        let mut tx = Transaction::new().with(user("42", false));
        for n in &nodes {
            tx.push(WriteOp::CreateMessage { message: n.clone(), sender_id: "42".into() });
        }
        graph.apply(tx).await.unwrap();

        let resolver = ConversationChainResolver::new(graph, ChainConfig { max_hops: 50, limit: 3 });
        let chain = resolver.resolve("42").await.unwrap();
        let ids: Vec<MessageId> = chain.iter().map(|e| e.message_id).collect();
        assert_eq!(ids, vec![nodes[2].id, nodes[3].id, nodes[4].id]);
    }

    #[tokio::test]
    async fn test_unknown_user_has_empty_chain() {
        let resolver = ConversationChainResolver::new(
            Arc::new(InMemoryGraphStore::new()),
            ChainConfig::default(),
        );
        assert!(resolver.resolve("nobody").await.unwrap().is_empty());
    }
}
