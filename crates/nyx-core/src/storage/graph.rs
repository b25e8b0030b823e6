//! In-process graph store on top of petgraph

use super::snapshot::{self, GraphSnapshot, SnapshotMessage, SnapshotSummary};
use super::{
    GraphStore, MessageId, MessageNode, StoredMessage, SummaryId, SummaryNode, Transaction,
    UserNode, WriteOp,
};
use crate::error::{NyxError, NyxResult};
use crate::memory::vector::{cosine_similarity, SearchResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use petgraph::Direction;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Debug, Clone)]
enum GraphNode {
    User(UserNode),
    Message(MessageNode),
    Summary(SummaryNode),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Relation {
    Sent,
    RepliesTo,
    HadConversation,
    PartOf,
    Knows,
}

/// Graph plus unique-key indexes
#[derive(Debug, Clone, Default)]
pub(super) struct GraphState {
    graph: StableDiGraph<GraphNode, Relation>,
    users: HashMap<String, NodeIndex>,
    messages: HashMap<MessageId, NodeIndex>,
    platform_ids: HashMap<String, NodeIndex>,
    summaries: HashMap<SummaryId, NodeIndex>,
    dimensions: Option<usize>,
}

impl GraphState {
    fn apply(&mut self, op: WriteOp) -> NyxResult<()> {
        match op {
            WriteOp::UpsertUser {
                id,
                username,
                is_bot,
                seen_at,
            } => {
                self.upsert_user(&id, username, is_bot, seen_at);
                Ok(())
            }
            WriteOp::SetKnownName { user_id, name } => {
                let idx = self.upsert_user(&user_id, None, false, Utc::now());
                if let Some(GraphNode::User(user)) = self.graph.node_weight_mut(idx) {
                    user.known_name = Some(name);
                }
                Ok(())
            }
            WriteOp::CreateMessage { message, sender_id } => {
                self.create_message(message, &sender_id).map(|_| ())
            }
            WriteOp::LinkReply { from, to } => self.link_reply(from, to),
            WriteOp::LinkReplyByPlatformId { from, platform_id } => {
                let target = self
                    .platform_ids
                    .get(&platform_id)
                    .and_then(|idx| self.message_node(*idx))
                    .map(|m| m.id);
                match target {
                    Some(to) => self.link_reply(from, to),
                    None => {
                        debug!(%from, platform_id, "Reply target not stored, skipping edge");
                        Ok(())
                    }
                }
            }
            WriteOp::SetPlatformId {
                message_id,
                platform_id,
            } => self.set_platform_id(message_id, platform_id),
            WriteOp::CreateSummary { summary, user_id } => {
                self.create_summary(summary, &user_id).map(|_| ())
            }
            WriteOp::LinkPartOfByPlatformId {
                platform_id,
                summary,
            } => {
                let summary_idx = *self.summaries.get(&summary).ok_or_else(|| {
                    NyxError::constraint("part_of_endpoints", format!("unknown summary {summary}"))
                })?;
                match self.platform_ids.get(&platform_id).copied() {
                    Some(message_idx) => {
                        self.add_edge_once(message_idx, summary_idx, Relation::PartOf);
                        Ok(())
                    }
                    None => {
                        debug!(%summary, platform_id, "Covered message not stored, skipping edge");
                        Ok(())
                    }
                }
            }
            WriteOp::LinkKnows { from, to } => {
                let (from_idx, to_idx) = match (self.users.get(&from), self.users.get(&to)) {
                    (Some(a), Some(b)) => (*a, *b),
                    _ => {
                        return Err(NyxError::constraint(
                            "knows_endpoints",
                            format!("{from} -> {to}"),
                        ))
                    }
                };
                self.add_edge_once(from_idx, to_idx, Relation::Knows);
                Ok(())
            }
        }
    }

    fn upsert_user(
        &mut self,
        id: &str,
        username: Option<String>,
        is_bot: bool,
        seen_at: DateTime<Utc>,
    ) -> NodeIndex {
        if let Some(&idx) = self.users.get(id) {
            if let Some(GraphNode::User(user)) = self.graph.node_weight_mut(idx) {
                if let Some(name) = username {
                    user.username = name;
                }
                user.is_bot |= is_bot;
                user.last_seen = user.last_seen.max(seen_at);
            }
            return idx;
        }

        let user = UserNode {
            id: id.to_string(),
            username: username.unwrap_or_else(|| id.to_string()),
            known_name: None,
            is_bot,
            last_seen: seen_at,
        };
        self.insert_user(user)
    }

    fn insert_user(&mut self, user: UserNode) -> NodeIndex {
        let id = user.id.clone();
        let idx = self.graph.add_node(GraphNode::User(user));
        self.users.insert(id, idx);
        idx
    }

    fn check_dimensions(&mut self, vector: &[f32], what: &str) -> NyxResult<()> {
        match self.dimensions {
            Some(dims) if dims != vector.len() => Err(NyxError::constraint(
                "embedding_dimensions",
                format!("{what} has {} dimensions, store uses {dims}", vector.len()),
            )),
            Some(_) => Ok(()),
            None => {
                self.dimensions = Some(vector.len());
                Ok(())
            }
        }
    }

    fn create_message(&mut self, message: MessageNode, sender_id: &str) -> NyxResult<NodeIndex> {
        if self.messages.contains_key(&message.id) {
            return Err(NyxError::constraint(
                "unique_message_id",
                message.id.to_string(),
            ));
        }
        if let Some(platform_id) = &message.platform_id {
            if self.platform_ids.contains_key(platform_id) {
                return Err(NyxError::constraint(
                    "unique_platform_id",
                    platform_id.clone(),
                ));
            }
        }
        let sender_idx = *self.users.get(sender_id).ok_or_else(|| {
            NyxError::constraint("message_sender", format!("unknown user {sender_id}"))
        })?;
        self.check_dimensions(&message.embedding, "message embedding")?;

        let id = message.id;
        let platform_id = message.platform_id.clone();
        let idx = self.graph.add_node(GraphNode::Message(message));
        self.graph.add_edge(sender_idx, idx, Relation::Sent);
        self.messages.insert(id, idx);
        if let Some(platform_id) = platform_id {
            self.platform_ids.insert(platform_id, idx);
        }
        Ok(idx)
    }

    fn reply_target(&self, idx: NodeIndex) -> Option<NodeIndex> {
        self.graph
            .edges_directed(idx, Direction::Outgoing)
            .find(|e| *e.weight() == Relation::RepliesTo)
            .map(|e| e.target())
    }

    fn link_reply(&mut self, from: MessageId, to: MessageId) -> NyxResult<()> {
        let (from_idx, to_idx) = match (self.messages.get(&from), self.messages.get(&to)) {
            (Some(a), Some(b)) => (*a, *b),
            _ => {
                return Err(NyxError::constraint(
                    "reply_endpoints",
                    format!("{from} -> {to}"),
                ))
            }
        };
        if from_idx == to_idx {
            return Err(NyxError::constraint("reply_forest", format!("{from} replies to itself")));
        }
        if self.reply_target(from_idx).is_some() {
            return Err(NyxError::constraint(
                "single_reply_target",
                format!("{from} already replies to a message"),
            ));
        }

        // Walking up from the target must never reach the replying message.
        let mut cursor = Some(to_idx);
        let mut steps = 0;
        while let Some(idx) = cursor {
            if idx == from_idx {
                return Err(NyxError::constraint("reply_forest", format!("{from} -> {to} closes a cycle")));
            }
            steps += 1;
            if steps > self.messages.len() {
                break;
            }
            cursor = self.reply_target(idx);
        }

        self.graph.add_edge(from_idx, to_idx, Relation::RepliesTo);
        Ok(())
    }

    fn set_platform_id(&mut self, message_id: MessageId, platform_id: String) -> NyxResult<()> {
        let idx = *self.messages.get(&message_id).ok_or_else(|| {
            NyxError::constraint("message_exists", message_id.to_string())
        })?;
        if let Some(&owner) = self.platform_ids.get(&platform_id) {
            if owner == idx {
                return Ok(());
            }
            return Err(NyxError::constraint("unique_platform_id", platform_id));
        }
        if let Some(GraphNode::Message(message)) = self.graph.node_weight_mut(idx) {
            if let Some(existing) = &message.platform_id {
                return Err(NyxError::constraint(
                    "platform_id_bound_once",
                    format!("{message_id} already bound to {existing}"),
                ));
            }
            message.platform_id = Some(platform_id.clone());
        }
        self.platform_ids.insert(platform_id, idx);
        Ok(())
    }

    fn create_summary(&mut self, summary: SummaryNode, user_id: &str) -> NyxResult<NodeIndex> {
        if self.summaries.contains_key(&summary.id) {
            return Err(NyxError::constraint("unique_summary_id", summary.id.to_string()));
        }
        if summary.start_time > summary.end_time {
            return Err(NyxError::constraint(
                "summary_time_range",
                format!("{} > {}", summary.start_time, summary.end_time),
            ));
        }
        let user_idx = *self.users.get(user_id).ok_or_else(|| {
            NyxError::constraint("summary_owner", format!("unknown user {user_id}"))
        })?;
        self.check_dimensions(&summary.embedding, "summary embedding")?;

        let id = summary.id;
        let idx = self.graph.add_node(GraphNode::Summary(summary));
        self.graph.add_edge(user_idx, idx, Relation::HadConversation);
        self.summaries.insert(id, idx);
        Ok(idx)
    }

    fn add_edge_once(&mut self, from: NodeIndex, to: NodeIndex, relation: Relation) {
        let exists = self
            .graph
            .edges_connecting(from, to)
            .any(|e| *e.weight() == relation);
        if !exists {
            self.graph.add_edge(from, to, relation);
        }
    }

    fn user_node(&self, idx: NodeIndex) -> Option<&UserNode> {
        match self.graph.node_weight(idx) {
            Some(GraphNode::User(user)) => Some(user),
            _ => None,
        }
    }

    fn message_node(&self, idx: NodeIndex) -> Option<&MessageNode> {
        match self.graph.node_weight(idx) {
            Some(GraphNode::Message(message)) => Some(message),
            _ => None,
        }
    }

    fn summary_node(&self, idx: NodeIndex) -> Option<&SummaryNode> {
        match self.graph.node_weight(idx) {
            Some(GraphNode::Summary(summary)) => Some(summary),
            _ => None,
        }
    }

    fn sender_of(&self, idx: NodeIndex) -> Option<NodeIndex> {
        self.graph
            .edges_directed(idx, Direction::Incoming)
            .find(|e| *e.weight() == Relation::Sent)
            .map(|e| e.source())
    }

    fn stored(&self, idx: NodeIndex) -> Option<StoredMessage> {
        let message = self.message_node(idx)?.clone();
        let sender = self.user_node(self.sender_of(idx)?)?.clone();
        Some(StoredMessage { message, sender })
    }

    fn check_query(&self, query: &[f32]) -> NyxResult<()> {
        match self.dimensions {
            Some(dims) if dims != query.len() => Err(NyxError::validation(
                "query_embedding",
                format!("must have {dims} dimensions"),
                query.len().to_string(),
            )),
            _ => Ok(()),
        }
    }

    fn to_snapshot(&self) -> GraphSnapshot {
        let mut snapshot = GraphSnapshot::default();

        for idx in self.graph.node_indices() {
            match &self.graph[idx] {
                GraphNode::User(user) => snapshot.users.push(user.clone()),
                GraphNode::Message(message) => {
                    if let Some(sender) = self.sender_of(idx).and_then(|s| self.user_node(s)) {
                        snapshot.messages.push(SnapshotMessage {
                            sender_id: sender.id.clone(),
                            message: message.clone(),
                        });
                    }
                }
                GraphNode::Summary(summary) => {
                    let owner = self
                        .graph
                        .edges_directed(idx, Direction::Incoming)
                        .find(|e| *e.weight() == Relation::HadConversation)
                        .and_then(|e| self.user_node(e.source()));
                    if let Some(owner) = owner {
                        snapshot.summaries.push(SnapshotSummary {
                            user_id: owner.id.clone(),
                            summary: summary.clone(),
                        });
                    }
                }
            }
        }

        for edge in self.graph.edge_references() {
            let (source, target) = (edge.source(), edge.target());
            match edge.weight() {
                Relation::RepliesTo => {
                    if let (Some(a), Some(b)) = (self.message_node(source), self.message_node(target)) {
                        snapshot.replies.push((a.id, b.id));
                    }
                }
                Relation::PartOf => {
                    if let (Some(m), Some(s)) = (self.message_node(source), self.summary_node(target)) {
                        snapshot.part_of.push((m.id, s.id));
                    }
                }
                Relation::Knows => {
                    if let (Some(a), Some(b)) = (self.user_node(source), self.user_node(target)) {
                        snapshot.knows.push((a.id.clone(), b.id.clone()));
                    }
                }
                Relation::Sent | Relation::HadConversation => {}
            }
        }

        // Replay order matters for sender lookups, not for correctness of reads.
        snapshot.messages.sort_by(|a, b| a.message.timestamp.cmp(&b.message.timestamp));
        snapshot
    }

    fn from_snapshot(snapshot: GraphSnapshot) -> NyxResult<Self> {
        let mut state = Self::default();

        for user in snapshot.users {
            if state.users.contains_key(&user.id) {
                return Err(NyxError::constraint("unique_user_id", user.id));
            }
            state.insert_user(user);
        }
        for entry in snapshot.messages {
            state.create_message(entry.message, &entry.sender_id)?;
        }
        for entry in snapshot.summaries {
            state.create_summary(entry.summary, &entry.user_id)?;
        }
        for (from, to) in snapshot.replies {
            state.link_reply(from, to)?;
        }
        for (message, summary) in snapshot.part_of {
            if let (Some(&m), Some(&s)) = (state.messages.get(&message), state.summaries.get(&summary)) {
                state.add_edge_once(m, s, Relation::PartOf);
            }
        }
        for (from, to) in snapshot.knows {
            state.apply(WriteOp::LinkKnows { from, to })?;
        }

        Ok(state)
    }
}

fn by_score_then_recency<T>(
    a: &SearchResult<T>,
    b: &SearchResult<T>,
    time: impl Fn(&T) -> DateTime<Utc>,
) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| time(&b.item).cmp(&time(&a.item)))
}

/// Graph store kept in process memory, optionally mirrored to a JSON snapshot
///
/// Each transaction is staged on a copy of the graph and swapped in only
/// after all operations (and the snapshot write, when configured) succeed.
#[derive(Debug, Default)]
pub struct InMemoryGraphStore {
    state: RwLock<GraphState>,
    snapshot_path: Option<PathBuf>,
}

impl InMemoryGraphStore {
    /// Empty, non-persistent store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store persisted to `path`, reloading an existing snapshot
    pub fn open(path: impl Into<PathBuf>) -> NyxResult<Self> {
        let path = path.into();
        let state = match snapshot::load(&path)? {
            Some(snapshot) => {
                let state = GraphState::from_snapshot(snapshot)?;
                info!(
                    path = %path.display(),
                    users = state.users.len(),
                    messages = state.messages.len(),
                    summaries = state.summaries.len(),
                    "Loaded graph snapshot"
                );
                state
            }
            None => GraphState::default(),
        };

        Ok(Self {
            state: RwLock::new(state),
            snapshot_path: Some(path),
        })
    }

    /// Number of stored messages
    pub fn message_count(&self) -> usize {
        self.state.read().messages.len()
    }

    /// Number of stored users
    pub fn user_count(&self) -> usize {
        self.state.read().users.len()
    }

    /// Number of stored summaries
    pub fn summary_count(&self) -> usize {
        self.state.read().summaries.len()
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn apply(&self, tx: Transaction) -> NyxResult<()> {
        if tx.is_empty() {
            return Ok(());
        }
        let op_count = tx.len();

        let mut state = self.state.write();
        let mut staged = state.clone();
        for op in tx.into_ops() {
            staged.apply(op)?;
        }
        if let Some(path) = &self.snapshot_path {
            snapshot::save(&staged.to_snapshot(), path)?;
        }
        *state = staged;

        debug!(op_count, "Committed graph transaction");
        Ok(())
    }

    async fn user(&self, id: &str) -> NyxResult<Option<UserNode>> {
        let state = self.state.read();
        Ok(state
            .users
            .get(id)
            .and_then(|idx| state.user_node(*idx))
            .cloned())
    }

    async fn message(&self, id: MessageId) -> NyxResult<Option<StoredMessage>> {
        let state = self.state.read();
        Ok(state.messages.get(&id).and_then(|idx| state.stored(*idx)))
    }

    async fn message_by_platform_id(&self, platform_id: &str) -> NyxResult<Option<StoredMessage>> {
        let state = self.state.read();
        Ok(state
            .platform_ids
            .get(platform_id)
            .and_then(|idx| state.stored(*idx)))
    }

    async fn recent_messages_by_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> NyxResult<Vec<StoredMessage>> {
        let state = self.state.read();
        let Some(&user_idx) = state.users.get(user_id) else {
            return Ok(Vec::new());
        };

        let mut sent: Vec<StoredMessage> = state
            .graph
            .edges_directed(user_idx, Direction::Outgoing)
            .filter(|e| *e.weight() == Relation::Sent)
            .filter_map(|e| state.stored(e.target()))
            .collect();

        sent.sort_by(|a, b| {
            b.message
                .timestamp
                .cmp(&a.message.timestamp)
                .then_with(|| b.message.id.cmp(&a.message.id))
        });
        sent.truncate(limit);
        Ok(sent)
    }

    async fn reply_neighbors(&self, id: MessageId) -> NyxResult<Vec<StoredMessage>> {
        let state = self.state.read();
        let Some(&idx) = state.messages.get(&id) else {
            return Ok(Vec::new());
        };

        let parents = state
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .filter(|e| *e.weight() == Relation::RepliesTo)
            .map(|e| e.target());
        let children = state
            .graph
            .edges_directed(idx, Direction::Incoming)
            .filter(|e| *e.weight() == Relation::RepliesTo)
            .map(|e| e.source());

        Ok(parents
            .chain(children)
            .filter_map(|n| state.stored(n))
            .collect())
    }

    async fn search_messages(
        &self,
        query: &[f32],
        min_similarity: f32,
        limit: usize,
    ) -> NyxResult<Vec<SearchResult<StoredMessage>>> {
        let state = self.state.read();
        state.check_query(query)?;

        let mut hits: Vec<SearchResult<StoredMessage>> = state
            .messages
            .values()
            .filter_map(|idx| {
                let message = state.message_node(*idx)?;
                let score = cosine_similarity(query, &message.embedding)?;
                (score >= min_similarity)
                    .then(|| state.stored(*idx).map(|m| SearchResult::new(m, score)))
                    .flatten()
            })
            .collect();

        hits.sort_by(|a, b| by_score_then_recency(a, b, |m| m.message.timestamp));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn search_summaries(
        &self,
        query: &[f32],
        min_similarity: f32,
        limit: usize,
    ) -> NyxResult<Vec<SearchResult<SummaryNode>>> {
        let state = self.state.read();
        state.check_query(query)?;

        let mut hits: Vec<SearchResult<SummaryNode>> = state
            .summaries
            .values()
            .filter_map(|idx| {
                let summary = state.summary_node(*idx)?;
                let score = cosine_similarity(query, &summary.embedding)?;
                (score >= min_similarity).then(|| SearchResult::new(summary.clone(), score))
            })
            .collect();

        hits.sort_by(|a, b| by_score_then_recency(a, b, |s| s.end_time));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn summaries_for_user(&self, user_id: &str) -> NyxResult<Vec<SummaryNode>> {
        let state = self.state.read();
        let Some(&user_idx) = state.users.get(user_id) else {
            return Ok(Vec::new());
        };

        let mut summaries: Vec<SummaryNode> = state
            .graph
            .edges_directed(user_idx, Direction::Outgoing)
            .filter(|e| *e.weight() == Relation::HadConversation)
            .filter_map(|e| state.summary_node(e.target()).cloned())
            .collect();
        summaries.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        Ok(summaries)
    }

    async fn summary_messages(&self, id: SummaryId) -> NyxResult<Vec<StoredMessage>> {
        let state = self.state.read();
        let Some(&summary_idx) = state.summaries.get(&id) else {
            return Ok(Vec::new());
        };

        let mut covered: Vec<StoredMessage> = state
            .graph
            .edges_directed(summary_idx, Direction::Incoming)
            .filter(|e| *e.weight() == Relation::PartOf)
            .filter_map(|e| state.stored(e.source()))
            .collect();
        covered.sort_by(|a, b| a.message.timestamp.cmp(&b.message.timestamp));
        Ok(covered)
    }

    async fn last_message_time(&self, channel_id: &str) -> NyxResult<Option<DateTime<Utc>>> {
        let state = self.state.read();
        Ok(state
            .messages
            .values()
            .filter_map(|idx| state.message_node(*idx))
            .filter(|m| m.channel_id.as_deref() == Some(channel_id))
            .map(|m| m.timestamp)
            .max())
    }

    async fn known_users(&self, user_id: &str) -> NyxResult<Vec<UserNode>> {
        let state = self.state.read();
        let Some(&user_idx) = state.users.get(user_id) else {
            return Ok(Vec::new());
        };

        Ok(state
            .graph
            .edges_directed(user_idx, Direction::Outgoing)
            .filter(|e| *e.weight() == Relation::Knows)
            .filter_map(|e| state.user_node(e.target()).cloned())
            .collect())
    }
}
