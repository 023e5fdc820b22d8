//! Line-level decoding of Claude Code session logs
//!
//! Each line of a session file is one JSON object with a `type` field.
//! [`decode`] turns a line into an [`Event`]; anything it cannot make sense
//! of comes back as a [`DecodeError`], which callers treat as "skip this
//! line" rather than a failure of the whole file.
//!
//! | `type` | Event |
//! |--------|-------|
//! | `assistant` | [`EventKind::Assistant`] |
//! | `user` | [`EventKind::User`] |
//! | `system` with `subtype = "compact_boundary"` | [`EventKind::Compaction`] |
//! | anything else | [`EventKind::Unknown`] |

use crate::types::Usage;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Why a line was not decoded.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid JSON record: {0}")]
    Json(#[from] serde_json::Error),

    #[error("assistant record has no message")]
    MissingMessage,
}

/// One decoded log line.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Raw ISO-8601 timestamp, if the record carried one
    pub timestamp: Option<String>,
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    Assistant(AssistantTurn),
    User(UserTurn),
    Compaction { trigger: String, pre_tokens: i64 },
    Unknown,
}

/// An API response from the model.
///
/// The same `message_id` can appear on several consecutive records when a
/// response is streamed in pieces.
#[derive(Debug, Clone, PartialEq)]
pub struct AssistantTurn {
    pub message_id: Option<String>,
    pub model: Option<String>,
    pub usage: Option<Usage>,
    pub content: Content,
}

/// Input sent to the model: human text, tool results, or both.
#[derive(Debug, Clone, PartialEq)]
pub struct UserTurn {
    /// `userType == "external"`; internal records are tool plumbing
    pub external: bool,
    pub content: Content,
    /// Top-level `toolUseResult` payload keyed by `toolUseID`
    pub tool_result: Option<(String, Value)>,
}

/// Message content: a bare string or a list of typed blocks.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl Default for Content {
    fn default() -> Self {
        Content::Blocks(Vec::new())
    }
}

impl Content {
    /// Text blocks joined by newlines, or the bare string.
    pub fn text(&self) -> String {
        match self {
            Content::Text(s) => s.clone(),
            Content::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    pub fn blocks(&self) -> &[ContentBlock] {
        match self {
            Content::Text(_) => &[],
            Content::Blocks(blocks) => blocks,
        }
    }
}

/// A content block within a message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: Value,
    },
    // thinking, image, and anything newer
    #[serde(other)]
    Unknown,
}

/// Raw JSONL record, every field optional.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawRecord {
    #[serde(rename = "type")]
    record_type: Option<String>,
    timestamp: Option<String>,
    user_type: Option<String>,
    // Only assistant and user records are held to the message shape
    message: Option<Value>,
    tool_use_result: Option<Value>,
    #[serde(rename = "toolUseID")]
    tool_use_id: Option<String>,
    subtype: Option<String>,
    compact_metadata: Option<RawCompactMetadata>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawMessage {
    id: Option<String>,
    model: Option<String>,
    content: Option<Content>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawCompactMetadata {
    trigger: Option<String>,
    pre_tokens: Option<i64>,
}

/// Decode one log line.
pub fn decode(line: &str) -> Result<Event, DecodeError> {
    let raw: RawRecord = serde_json::from_str(line)?;

    let kind = match raw.record_type.as_deref() {
        Some("assistant") => {
            let msg: RawMessage =
                serde_json::from_value(raw.message.ok_or(DecodeError::MissingMessage)?)?;
            EventKind::Assistant(AssistantTurn {
                message_id: msg.id,
                model: msg.model,
                usage: msg.usage,
                content: msg.content.unwrap_or_default(),
            })
        }
        Some("user") => {
            let tool_result = match (raw.tool_use_id, raw.tool_use_result) {
                (Some(id), Some(result)) if is_truthy(&result) => Some((id, result)),
                _ => None,
            };
            let content = match raw.message {
                Some(value) => serde_json::from_value::<RawMessage>(value)?.content,
                None => None,
            };
            EventKind::User(UserTurn {
                external: raw.user_type.as_deref() == Some("external"),
                content: content.unwrap_or_default(),
                tool_result,
            })
        }
        Some("system") if raw.subtype.as_deref() == Some("compact_boundary") => {
            match raw.compact_metadata {
                Some(meta) => EventKind::Compaction {
                    trigger: meta.trigger.unwrap_or_else(|| "auto".to_string()),
                    pre_tokens: meta.pre_tokens.unwrap_or(0),
                },
                None => EventKind::Unknown,
            }
        }
        _ => EventKind::Unknown,
    };

    Ok(Event {
        timestamp: raw.timestamp.filter(|ts| !ts.is_empty()),
        kind,
    })
}

/// JavaScript-style truthiness of a JSON value.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_assistant() {
        let line = r#"{"type":"assistant","timestamp":"2025-01-01T00:00:00Z","message":{"id":"msg_1","model":"claude-opus-4-6","usage":{"input_tokens":10,"output_tokens":5,"cache_creation":{"ephemeral_5m_input_tokens":3}},"content":[{"type":"thinking","thinking":"hm"},{"type":"text","text":"Hi"},{"type":"tool_use","id":"tu_1","name":"Read","input":{"file_path":"/a.ts"}}]}}"#;
        let event = decode(line).unwrap();
        assert_eq!(event.timestamp.as_deref(), Some("2025-01-01T00:00:00Z"));

        let EventKind::Assistant(turn) = event.kind else {
            panic!("expected assistant event");
        };
        assert_eq!(turn.message_id.as_deref(), Some("msg_1"));
        let usage = turn.usage.unwrap();
        assert_eq!(usage.input_tokens, 10);
        assert_eq!(usage.cache_read_input_tokens, 0);
        assert_eq!(usage.cache_creation.unwrap().ephemeral_5m_input_tokens, 3);
        assert_eq!(turn.content.text(), "Hi");
        assert_eq!(turn.content.blocks().len(), 3);
        assert!(matches!(turn.content.blocks()[0], ContentBlock::Unknown));
    }

    #[test]
    fn test_null_usage_counters_count_as_zero() {
        let line = r#"{"type":"assistant","message":{"id":"msg_1","usage":{"input_tokens":100,"output_tokens":null,"cache_creation_input_tokens":null,"cache_creation":{"ephemeral_1h_input_tokens":null}},"content":[{"type":"tool_use","id":"tu_1","name":"Read","input":{}}]}}"#;
        let EventKind::Assistant(turn) = decode(line).unwrap().kind else {
            panic!("expected assistant event");
        };
        let usage = turn.usage.unwrap();
        assert_eq!(usage.input_tokens, 100);
        assert_eq!(usage.output_tokens, 0);
        assert_eq!(usage.cache_creation_input_tokens, 0);
        assert_eq!(usage.cache_creation.unwrap().ephemeral_1h_input_tokens, 0);
        assert_eq!(turn.content.blocks().len(), 1);
    }

    #[test]
    fn test_decode_user_with_tool_result() {
        let line = r#"{"type":"user","userType":"external","toolUseID":"tu_1","toolUseResult":{"stdout":"ok"},"message":{"role":"user","content":[{"type":"tool_result","tool_use_id":"tu_1","content":"ok"}]}}"#;
        let EventKind::User(turn) = decode(line).unwrap().kind else {
            panic!("expected user event");
        };
        assert!(turn.external);
        assert_eq!(turn.tool_result, Some(("tu_1".to_string(), json!({"stdout": "ok"}))));
        assert!(matches!(
            &turn.content.blocks()[0],
            ContentBlock::ToolResult { tool_use_id, .. } if tool_use_id == "tu_1"
        ));
    }

    #[test]
    fn test_empty_tool_use_result_is_ignored() {
        let line = r#"{"type":"user","toolUseID":"tu_1","toolUseResult":"","message":{"content":"x"}}"#;
        let EventKind::User(turn) = decode(line).unwrap().kind else {
            panic!("expected user event");
        };
        assert!(!turn.external);
        assert!(turn.tool_result.is_none());
        assert_eq!(turn.content, Content::Text("x".into()));
    }

    #[test]
    fn test_decode_compaction() {
        let line = r#"{"type":"system","subtype":"compact_boundary","timestamp":"t","compactMetadata":{"preTokens":155000}}"#;
        let event = decode(line).unwrap();
        assert_eq!(
            event.kind,
            EventKind::Compaction {
                trigger: "auto".into(),
                pre_tokens: 155_000
            }
        );

        let other = r#"{"type":"system","subtype":"informational","content":"x"}"#;
        assert_eq!(decode(other).unwrap().kind, EventKind::Unknown);
    }

    #[test]
    fn test_unknown_and_malformed() {
        let summary = r#"{"type":"summary","summary":"Fix bug","timestamp":"2025-01-01T00:00:00Z"}"#;
        let event = decode(summary).unwrap();
        assert_eq!(event.kind, EventKind::Unknown);
        assert!(event.timestamp.is_some());

        assert!(matches!(decode("{not json"), Err(DecodeError::Json(_))));
        assert!(matches!(decode("42"), Err(DecodeError::Json(_))));
        assert!(matches!(
            decode(r#"{"type":"assistant"}"#),
            Err(DecodeError::MissingMessage)
        ));
    }
}
