//! Agent configuration

use crate::error::{NyxError, NyxResult};
use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings for context assembly and tool orchestration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// System prompt placed before every context window
    pub system_prompt: String,

    /// Maximum entries in a conversation's rolling window
    pub window_size: usize,

    /// Maximum conversations kept before the least recently used is dropped
    pub max_conversations: usize,

    /// Requesting/Executing cycles allowed per user turn
    pub max_turns: usize,

    /// Advertise tools on a conversation's first reply
    pub tools_on_first_message: bool,

    /// Default floor for `search_memories`
    pub search_min_similarity: f32,

    /// Results returned by `search_memories`
    pub search_limit: usize,

    /// Deadline for each chat completion call
    pub capability_timeout: Duration,

    /// Fixed offset used for rendered times, in hours east of UTC
    pub utc_offset_hours: i32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: "You are Nyx, a helpful assistant with long-term memory.".to_string(),
            window_size: 20,
            max_conversations: 1024,
            max_turns: 5,
            tools_on_first_message: false,
            search_min_similarity: 0.6,
            search_limit: 5,
            capability_timeout: Duration::from_secs(30),
            utc_offset_hours: 0,
        }
    }
}

impl AgentConfig {
    /// Default configuration with a custom system prompt
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            ..Self::default()
        }
    }

    /// Set the window size
    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size;
        self
    }

    /// Set the conversation cap
    pub fn with_max_conversations(mut self, max: usize) -> Self {
        self.max_conversations = max;
        self
    }

    /// Set the turn bound
    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    /// Advertise tools on first replies too
    pub fn with_tools_on_first_message(mut self, enabled: bool) -> Self {
        self.tools_on_first_message = enabled;
        self
    }

    /// Set search defaults
    pub fn with_search(mut self, min_similarity: f32, limit: usize) -> Self {
        self.search_min_similarity = min_similarity;
        self.search_limit = limit;
        self
    }

    /// Set the chat completion deadline
    pub fn with_capability_timeout(mut self, timeout: Duration) -> Self {
        self.capability_timeout = timeout;
        self
    }

    /// Set the display offset
    pub fn with_utc_offset_hours(mut self, hours: i32) -> Self {
        self.utc_offset_hours = hours;
        self
    }

    /// Check value ranges
    pub fn validate(&self) -> NyxResult<()> {
        if self.window_size == 0 {
            return Err(NyxError::validation("window_size", "must be at least 1", "0"));
        }
        if self.max_conversations == 0 {
            return Err(NyxError::validation("max_conversations", "must be at least 1", "0"));
        }
        if self.max_turns == 0 {
            return Err(NyxError::validation("max_turns", "must be at least 1", "0"));
        }
        if !(0.0..=1.0).contains(&self.search_min_similarity) {
            return Err(NyxError::validation(
                "search_min_similarity",
                "must be between 0 and 1",
                self.search_min_similarity.to_string(),
            ));
        }
        if self.utc_offset_hours.abs() > 23 {
            return Err(NyxError::validation(
                "utc_offset_hours",
                "must be between -23 and 23",
                self.utc_offset_hours.to_string(),
            ));
        }
        Ok(())
    }

    /// The configured fixed offset (UTC when out of range)
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_hours * 3600)
            .unwrap_or_else(|| Utc.fix())
    }

    /// `now` in the configured offset
    pub fn local_time(&self, now: DateTime<Utc>) -> DateTime<FixedOffset> {
        now.with_timezone(&self.offset())
    }
}
