//! Core domain types for claude-deck
//!
//! These types describe what one parse pass over a session log produces and
//! what the store persists.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Session** | One top-level conversation backed by `<session-id>.jsonl` |
//! | **Sub-agent** | A spawned agent with its own log under `<session-id>/subagents/` |
//! | **Tool call** | One tool invocation and its eventual result |
//! | **Turn** | A run of assistant output following user input |
//! | **Compaction** | A context-window summarization marker with its pre-compaction size |
//!
//! Timestamps are kept as the ISO-8601 strings found in the logs. Ordering
//! across tool calls and messages is string-lexicographic on those values.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Deserializer, Serialize};

// ============================================
// Usage
// ============================================

/// Token counts reported for one API call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Usage {
    #[serde(deserialize_with = "null_as_zero")]
    pub input_tokens: i64,
    #[serde(deserialize_with = "null_as_zero")]
    pub output_tokens: i64,
    #[serde(deserialize_with = "null_as_zero")]
    pub cache_read_input_tokens: i64,
    #[serde(deserialize_with = "null_as_zero")]
    pub cache_creation_input_tokens: i64,
    /// Time-tiered split of `cache_creation_input_tokens`, when the log carries it
    pub cache_creation: Option<CacheCreation>,
}

/// Cache-write tokens split by ephemeral cache lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheCreation {
    #[serde(deserialize_with = "null_as_zero")]
    pub ephemeral_5m_input_tokens: i64,
    #[serde(deserialize_with = "null_as_zero")]
    pub ephemeral_1h_input_tokens: i64,
}

/// Token counters logged as `null` count as zero.
fn null_as_zero<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<i64>::deserialize(deserializer)?.unwrap_or(0))
}

impl Usage {
    /// Tokens sent in this call: fresh input plus cache reads plus cache writes.
    pub fn context_tokens(&self) -> i64 {
        self.input_tokens + self.cache_read_input_tokens + self.cache_creation_input_tokens
    }
}

/// Running sums of the four token counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenTotals {
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cache_read_tokens: i64,
    pub cache_create_tokens: i64,
}

impl TokenTotals {
    pub fn add(&mut self, usage: &Usage) {
        self.input_tokens += usage.input_tokens;
        self.output_tokens += usage.output_tokens;
        self.cache_read_tokens += usage.cache_read_input_tokens;
        self.cache_create_tokens += usage.cache_creation_input_tokens;
    }

    pub fn total(&self) -> i64 {
        self.input_tokens + self.output_tokens + self.cache_read_tokens + self.cache_create_tokens
    }
}

// ============================================
// Tool calls
// ============================================

/// Resolution state of a tool call.
///
/// A call starts `Pending` when the tool-use block is seen and moves to
/// `Success` at most once, when the first matching result arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Pending,
    Success,
}

impl ToolStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolStatus::Pending => "pending",
            ToolStatus::Success => "success",
        }
    }
}

impl std::str::FromStr for ToolStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ToolStatus::Pending),
            "success" => Ok(ToolStatus::Success),
            _ => Err(format!("unknown tool status: {}", s)),
        }
    }
}

/// One tool invocation.
///
/// `tool_input` and `tool_response` are serialized JSON (or raw result text)
/// capped at [`crate::ingest::MAX_TOOL_PAYLOAD_CHARS`] characters. Anything
/// past the cap is dropped and `...` is appended, so stored payloads are lossy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCall {
    pub tool_use_id: Option<String>,
    pub tool_name: String,
    pub tool_input: Option<String>,
    pub tool_response: Option<String>,
    pub status: ToolStatus,
    pub timestamp: String,
    /// Owning sub-agent, `None` for calls made by the top-level session
    pub subagent_id: Option<String>,
}

// ============================================
// Messages
// ============================================

/// Speaker of a rendered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            _ => Err(format!("unknown role: {}", s)),
        }
    }
}

/// One rendered turn of conversation text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: String,
    /// Assistant only
    pub model: Option<String>,
    /// Assistant only: cost of the usage on the record that produced this message
    pub cost_usd: Option<f64>,
}

/// A context compaction marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Compaction {
    pub timestamp: String,
    pub trigger: String,
    pub pre_tokens: i64,
}

// ============================================
// Aggregates
// ============================================

/// Everything one parse pass learns about a session.
///
/// Replaced wholesale in the store on every re-parse.
#[derive(Debug, Clone, Serialize)]
pub struct SessionAggregate {
    pub id: String,
    /// Display name derived from the project directory
    pub project: String,
    /// Raw project directory name
    pub project_hash: String,
    pub first_prompt: Option<String>,
    /// Model with the most distinct assistant messages
    pub model: Option<String>,
    pub tokens: TokenTotals,
    pub estimated_cost_usd: f64,
    pub message_count: i64,
    pub tool_call_count: i64,
    pub subagent_count: i64,
    pub turn_count: i64,
    pub peak_context_tokens: i64,
    pub started_at: Option<String>,
    pub ended_at: Option<String>,
    pub duration_ms: Option<i64>,
    pub source_path: String,
    /// RFC 3339 modification time of the source file when it was parsed
    pub source_mtime: String,
    pub tool_calls: Vec<ToolCall>,
    pub messages: Vec<Message>,
    pub compactions: Vec<Compaction>,
    pub subagents: Vec<SubagentAggregate>,
}

/// Everything one parse pass learns about a sub-agent.
#[derive(Debug, Clone, Serialize)]
pub struct SubagentAggregate {
    pub id: String,
    pub session_id: String,
    /// Inferred from the prompt; `None` when the sub-agent had no prompt
    pub agent_type: Option<String>,
    pub model: Option<String>,
    pub prompt: Option<String>,
    pub tokens: TokenTotals,
    pub estimated_cost_usd: f64,
    pub tool_call_count: i64,
    pub duration_ms: Option<i64>,
    pub result_summary: Option<String>,
}

// ============================================
// Timeline
// ============================================

/// One entry of a session's merged, time-ordered timeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimelineEntry {
    ToolCall(ToolCall),
    Message(Message),
}

impl TimelineEntry {
    pub fn timestamp(&self) -> &str {
        match self {
            TimelineEntry::ToolCall(c) => &c.timestamp,
            TimelineEntry::Message(m) => &m.timestamp,
        }
    }
}

/// Merge tool calls and messages into one timeline ordered by timestamp string.
///
/// The sort is stable. On equal timestamps tool calls come first, so an
/// assistant message's cost is attributed to the calls issued after it.
pub fn merge_timeline(tool_calls: Vec<ToolCall>, messages: Vec<Message>) -> Vec<TimelineEntry> {
    let mut entries: Vec<TimelineEntry> = tool_calls
        .into_iter()
        .map(TimelineEntry::ToolCall)
        .chain(messages.into_iter().map(TimelineEntry::Message))
        .collect();
    entries.sort_by(|a, b| a.timestamp().cmp(b.timestamp()));
    entries
}

/// Milliseconds between two ISO-8601 timestamps.
///
/// Returns `None` if either side does not parse.
pub fn elapsed_ms(start: &str, end: &str) -> Option<i64> {
    let start = DateTime::<FixedOffset>::parse_from_rfc3339(start).ok()?;
    let end = DateTime::<FixedOffset>::parse_from_rfc3339(end).ok()?;
    Some((end - start).num_milliseconds())
}
