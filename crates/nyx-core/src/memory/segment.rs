//! Topic-shift segmentation
//!
//! Messages are weighted jointly with TF-IDF and handed to a
//! [`TopicCapability`]. A new segment starts at message `i` when its winning
//! topic differs from the running topic and the win is confident
//! (weight above `threshold`).

use super::tfidf::{TermMatrix, TfIdfVectorizer};
use super::topic::{TopicAssignment, TopicCapability};
use crate::error::{with_timeout, NyxResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Label used when no topic could be inferred
pub const GENERAL_TOPIC: &str = "general";

/// A message as it comes out of history, before normalization
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMessage {
    /// Text, possibly missing
    pub content: Option<String>,

    /// `user` or `assistant`
    pub role: String,

    /// Send time, possibly missing
    pub timestamp: Option<DateTime<Utc>>,

    /// Platform id used to link the message to its summary
    pub platform_id: Option<String>,
}

/// A normalized segment member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentMessage {
    /// `user` or `assistant`
    pub role: String,

    /// Non-empty text
    pub content: String,

    /// Send time
    pub timestamp: DateTime<Utc>,

    /// Platform id, if known
    pub platform_id: Option<String>,
}

impl SegmentMessage {
    /// Create a member
    pub fn new(role: impl Into<String>, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            timestamp,
            platform_id: None,
        }
    }

    /// Set the platform id
    pub fn with_platform_id(mut self, platform_id: impl Into<String>) -> Self {
        self.platform_id = Some(platform_id.into());
        self
    }
}

/// A contiguous run of messages sharing one dominant topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSegment {
    /// Members in chronological order
    pub messages: Vec<SegmentMessage>,

    /// Comma-joined topic keywords
    pub topic: String,

    /// First member timestamp
    pub start_time: DateTime<Utc>,

    /// Last member timestamp
    pub end_time: DateTime<Utc>,

    /// Filled in by the summarizer
    pub summary: Option<String>,
}

impl ConversationSegment {
    /// Segment spanning `messages`; `None` when empty
    pub fn from_messages(messages: Vec<SegmentMessage>, topic: String) -> Option<Self> {
        let start_time = messages.first()?.timestamp;
        let end_time = messages.last()?.timestamp;
        Some(Self {
            messages,
            topic,
            start_time,
            end_time,
            summary: None,
        })
    }
}

/// Segmentation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmenterConfig {
    /// Minimum winning-topic weight for a boundary
    pub threshold: f32,

    /// Keywords joined into a segment label
    pub label_keywords: usize,

    /// Deadline for the topic capability
    pub timeout: Duration,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            threshold: 0.3,
            label_keywords: 5,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Splits a message sequence into topic segments
#[derive(Clone)]
pub struct TopicSegmenter {
    topics: Arc<dyn TopicCapability>,
    vectorizer: TfIdfVectorizer,
    config: SegmenterConfig,
}

impl TopicSegmenter {
    /// Segmenter using the given topic capability
    pub fn new(topics: Arc<dyn TopicCapability>, config: SegmenterConfig) -> Self {
        Self {
            topics,
            vectorizer: TfIdfVectorizer::default(),
            config,
        }
    }

    /// Replace the vectorizer
    pub fn with_vectorizer(mut self, vectorizer: TfIdfVectorizer) -> Self {
        self.vectorizer = vectorizer;
        self
    }

    /// Drop empty content and default missing timestamps to now
    pub fn normalize(raw: Vec<RawMessage>) -> Vec<SegmentMessage> {
        let now = Utc::now();
        raw.into_iter()
            .filter_map(|m| {
                let content = m.content.filter(|c| !c.is_empty())?;
                Some(SegmentMessage {
                    role: m.role,
                    content,
                    timestamp: m.timestamp.unwrap_or(now),
                    platform_id: m.platform_id,
                })
            })
            .collect()
    }

    fn label(&self, keywords: &[String]) -> String {
        if keywords.is_empty() {
            return GENERAL_TOPIC.to_string();
        }
        keywords
            .iter()
            .take(self.config.label_keywords)
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn single(&self, messages: Vec<SegmentMessage>, topic: String) -> Vec<ConversationSegment> {
        ConversationSegment::from_messages(messages, topic)
            .into_iter()
            .collect()
    }

    /// Segment a chronological message sequence
    ///
    /// Never fails: when topics cannot be inferred the whole batch becomes a
    /// single `general` segment.
    pub async fn segment(&self, raw: Vec<RawMessage>) -> Vec<ConversationSegment> {
        let messages = Self::normalize(raw);
        match messages.len() {
            0 => return Vec::new(),
            1 => {
                let matrix = self.vectorizer.fit_transform(&[messages[0].content.as_str()]);
                let keywords = matrix
                    .rows()
                    .first()
                    .map(|row| matrix.top_terms(row, self.config.label_keywords))
                    .unwrap_or_default();
                let topic = self.label(&keywords);
                return self.single(messages, topic);
            }
            _ => {}
        }

        let documents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        let matrix = self.vectorizer.fit_transform(&documents);
        let assignment = match self.infer(&matrix).await {
            Ok(assignment) => assignment,
            Err(e) => {
                warn!(error = %e, messages = messages.len(), "Topic inference failed, using one general segment");
                return self.single(messages, GENERAL_TOPIC.to_string());
            }
        };

        self.split(messages, &assignment)
    }

    async fn infer(&self, matrix: &TermMatrix) -> NyxResult<TopicAssignment> {
        if matrix.is_empty() {
            return Err(crate::error::NyxError::topic("empty vocabulary"));
        }
        let assignment =
            with_timeout("topics_of", self.config.timeout, self.topics.topics_of(matrix)).await?;
        assignment.validate(matrix.n_documents())?;
        Ok(assignment)
    }

    fn split(
        &self,
        messages: Vec<SegmentMessage>,
        assignment: &TopicAssignment,
    ) -> Vec<ConversationSegment> {
        let topic_label = |topic: usize| {
            self.label(assignment.keywords.get(topic).map(Vec::as_slice).unwrap_or(&[]))
        };

        let mut segments = Vec::new();
        let mut running = assignment.dominant(0).map_or(0, |(t, _)| t);
        let mut current: Vec<SegmentMessage> = Vec::new();

        for (i, message) in messages.into_iter().enumerate() {
            if i > 0 {
                if let Some((topic, weight)) = assignment.dominant(i) {
                    if topic != running && weight > self.config.threshold {
                        let finished = std::mem::take(&mut current);
                        segments.extend(ConversationSegment::from_messages(finished, topic_label(running)));
                        running = topic;
                    }
                }
            }
            current.push(message);
        }
        segments.extend(ConversationSegment::from_messages(current, topic_label(running)));

        debug!(segments = segments.len(), "Segmented conversation");
        segments
    }
}
