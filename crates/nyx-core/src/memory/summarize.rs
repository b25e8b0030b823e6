//! Segment summarization with length control and fallbacks

use super::segment::ConversationSegment;
use crate::error::{with_timeout, NyxError, NyxResult};
use async_trait::async_trait;
use nyx_llm::{ChatCompletion, ChatMessage};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Text stored when nothing could be summarized
pub const SUMMARY_FAILURE: &str = "Error generating summary";

/// Below this many characters the transcript is kept as is
const VERBATIM_LIMIT: usize = 100;

/// Abstractive summarization capability
#[async_trait]
pub trait SummarizationCapability: Send + Sync {
    /// Summarize `text` to between `min_len` and `max_len` words
    async fn summarize(&self, text: &str, max_len: usize, min_len: usize) -> NyxResult<String>;
}

/// How a summary was produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummaryOutcome {
    /// Short transcript kept unchanged
    Verbatim(String),
    /// Capability output
    Summarized(String),
    /// First sentence of the transcript after a capability failure
    Fallback(String),
    /// Nothing usable
    Failed,
}

impl SummaryOutcome {
    /// Text to store
    pub fn text(&self) -> &str {
        match self {
            Self::Verbatim(text) | Self::Summarized(text) | Self::Fallback(text) => text,
            Self::Failed => SUMMARY_FAILURE,
        }
    }

    /// Whether the capability result was not used
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Fallback(_) | Self::Failed)
    }
}

/// Length bounds derived from the transcript's word count
pub fn target_lengths(word_count: usize) -> (usize, usize) {
    let max_len = (word_count / 2).clamp(30, 130);
    let min_len = 30.min(max_len - 20);
    (max_len, min_len)
}

/// `"{role}: {content}"` per message, space separated
pub fn transcript(segment: &ConversationSegment) -> String {
    segment
        .messages
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_sentence(text: &str) -> Option<String> {
    let first = text.split('.').next()?;
    if first.trim().is_empty() {
        return None;
    }
    Some(format!("{first}."))
}

/// Summarizes segments, never failing the caller
#[derive(Clone)]
pub struct Summarizer {
    capability: Arc<dyn SummarizationCapability>,
    timeout: Duration,
}

impl Summarizer {
    /// Summarizer over a capability with a 30s deadline
    pub fn new(capability: Arc<dyn SummarizationCapability>) -> Self {
        Self {
            capability,
            timeout: Duration::from_secs(30),
        }
    }

    /// Override the capability deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Summarize `segment` and store the text on `segment.summary`
    pub async fn summarize(&self, segment: &mut ConversationSegment) -> SummaryOutcome {
        let outcome = self.outcome_for(segment).await;
        segment.summary = Some(outcome.text().to_string());
        outcome
    }

    async fn outcome_for(&self, segment: &ConversationSegment) -> SummaryOutcome {
        if segment.messages.is_empty() {
            return SummaryOutcome::Failed;
        }
        let text = transcript(segment);
        if text.chars().count() < VERBATIM_LIMIT {
            return SummaryOutcome::Verbatim(text);
        }

        let words = text.split_whitespace().count();
        let (max_len, min_len) = target_lengths(words);
        debug!(words, max_len, min_len, "Summarizing segment");

        let result = with_timeout(
            "summarize",
            self.timeout,
            self.capability.summarize(&text, max_len, min_len),
        )
        .await;

        match result {
            Ok(summary) if !summary.trim().is_empty() => {
                SummaryOutcome::Summarized(summary.trim().to_string())
            }
            Ok(_) => self.fallback(&text, "empty summary"),
            Err(e) => self.fallback(&text, &e.to_string()),
        }
    }

    fn fallback(&self, text: &str, reason: &str) -> SummaryOutcome {
        warn!(reason, "Summarization failed, falling back to first sentence");
        match first_sentence(text) {
            Some(sentence) => SummaryOutcome::Fallback(sentence),
            None => SummaryOutcome::Failed,
        }
    }
}

/// [`SummarizationCapability`] backed by a chat completion model
pub struct LlmSummarizer {
    llm: Arc<dyn ChatCompletion>,
}

impl LlmSummarizer {
    /// Wrap a chat completion backend
    pub fn new(llm: Arc<dyn ChatCompletion>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl SummarizationCapability for LlmSummarizer {
    async fn summarize(&self, text: &str, max_len: usize, min_len: usize) -> NyxResult<String> {
        let messages = [
            ChatMessage::system(
                "You condense chat transcripts. Reply with the summary only, no preamble.",
            ),
            ChatMessage::user(format!(
                "Summarize this conversation in {min_len} to {max_len} words:\n\n{text}"
            )),
        ];

        let response = self
            .llm
            .chat_completion(&messages)
            .await
            .map_err(NyxError::summarization)?;

        let summary = response.content.trim();
        if summary.is_empty() {
            return Err(NyxError::summarization("model returned no text"));
        }
        Ok(summary.to_string())
    }
}
