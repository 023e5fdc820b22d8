//! Session log parser
//!
//! Parses `<project>/<session-id>.jsonl` in a single forward pass.
//!
//! # Accounting rules
//!
//! - **Duplicate message ids**: a streamed response is logged once per
//!   content chunk under the same message id. Text, model tally, and turn
//!   counting use the first occurrence only. Usage and cost are summed over
//!   *every* record, duplicates included.
//! - **Tool calls**: one entry per tool-use id, created `pending`. The first
//!   matching result flips it to `success`; later results are ignored.
//! - **Turns**: a turn starts at a new assistant message whose previous
//!   speaker was not the assistant. Only external user records reset the
//!   speaker; tool-result plumbing does not.
//! - **Peak context**: the largest `input + cache_read + cache_create` seen on
//!   any single record.
//!
//! Malformed lines are skipped. An I/O failure aborts the file.

use super::record::{decode, Content, ContentBlock, Event, EventKind, UserTurn};
use super::text::{clean_prompt, truncate};
use super::MAX_TOOL_PAYLOAD_CHARS;
use crate::error::Result;
use crate::pricing::PricingTable;
use crate::types::{
    elapsed_ms, Compaction, Message, Role, SessionAggregate, TokenTotals, ToolCall, ToolStatus,
    Usage,
};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

/// Identity of the session being parsed, supplied by the walker.
#[derive(Debug, Clone)]
pub struct SessionSource<'a> {
    pub id: &'a str,
    pub project: &'a str,
    pub project_hash: &'a str,
    pub path: &'a Path,
    /// RFC 3339 mtime recorded for skip detection on the next sync
    pub mtime: &'a str,
}

/// Parse one session log into an aggregate.
///
/// The returned aggregate has no sub-agents yet; the walker merges them in.
pub fn parse_session(source: &SessionSource<'_>, pricing: &PricingTable) -> Result<SessionAggregate> {
    let mut parser = SessionParser::new(pricing);
    for_each_event(source.path, |event| parser.feed(event))?;
    Ok(parser.finish(source))
}

/// Decode every non-blank line of `path`, skipping lines that do not decode.
pub(crate) fn for_each_event(path: &Path, mut on_event: impl FnMut(Event)) -> Result<()> {
    let reader = BufReader::new(File::open(path)?);
    let mut skipped = 0usize;

    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            // read_line consumed the bad bytes; carry on with the next line
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                skipped += 1;
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        if line.trim().is_empty() {
            continue;
        }
        match decode(&line) {
            Ok(event) => on_event(event),
            Err(_) => skipped += 1,
        }
    }

    if skipped > 0 {
        tracing::debug!(path = %path.display(), skipped, "Skipped undecodable lines");
    }
    Ok(())
}

struct SessionParser<'p> {
    pricing: &'p PricingTable,
    seen_message_ids: HashSet<String>,
    models: ModelTally,
    tools: ToolCallLedger,
    usage: UsageMeter,
    span: TimeSpan,
    messages: Vec<Message>,
    compactions: Vec<Compaction>,
    first_prompt: Option<String>,
    last_role: Option<Role>,
    turn_count: i64,
    peak_context_tokens: i64,
}

impl<'p> SessionParser<'p> {
    fn new(pricing: &'p PricingTable) -> Self {
        Self {
            pricing,
            seen_message_ids: HashSet::new(),
            models: ModelTally::default(),
            tools: ToolCallLedger::new(None),
            usage: UsageMeter::default(),
            span: TimeSpan::default(),
            messages: Vec::new(),
            compactions: Vec::new(),
            first_prompt: None,
            last_role: None,
            turn_count: 0,
            peak_context_tokens: 0,
        }
    }

    fn feed(&mut self, event: Event) {
        self.span.observe(event.timestamp.as_deref());
        let ts = event.timestamp.unwrap_or_default();

        match event.kind {
            EventKind::Assistant(turn) => {
                let already_seen = match &turn.message_id {
                    Some(id) => !self.seen_message_ids.insert(id.clone()),
                    None => false,
                };

                if !already_seen {
                    if let Some(model) = &turn.model {
                        self.models.record(model);
                    }
                }

                let mut turn_cost = 0.0;
                if let Some(usage) = &turn.usage {
                    turn_cost = self.usage.add(self.pricing, turn.model.as_deref(), usage);
                    self.peak_context_tokens = self.peak_context_tokens.max(usage.context_tokens());
                }

                for block in turn.content.blocks() {
                    if let ContentBlock::ToolUse { id, name, input } = block {
                        self.tools.open(id, name, input, &ts);
                    }
                }

                if !already_seen {
                    // Only block content carries assistant text
                    let text = match &turn.content {
                        Content::Blocks(_) => turn.content.text(),
                        Content::Text(_) => String::new(),
                    };
                    if !text.trim().is_empty() {
                        self.messages.push(Message {
                            role: Role::Assistant,
                            content: text,
                            timestamp: ts,
                            model: turn.model,
                            cost_usd: Some(turn_cost),
                        });
                    }

                    if self.last_role != Some(Role::Assistant) {
                        self.turn_count += 1;
                    }
                    self.last_role = Some(Role::Assistant);
                }
            }
            EventKind::User(turn) => {
                if turn.external {
                    let text = clean_prompt(&turn.content.text());
                    if !text.is_empty() {
                        if self.first_prompt.is_none() {
                            self.first_prompt = Some(text.clone());
                        }
                        self.messages.push(Message {
                            role: Role::User,
                            content: text,
                            timestamp: ts,
                            model: None,
                            cost_usd: None,
                        });
                    }
                }

                self.tools.resolve_from(&turn);

                if turn.external {
                    self.last_role = Some(Role::User);
                }
            }
            EventKind::Compaction {
                trigger,
                pre_tokens,
            } => {
                self.compactions.push(Compaction {
                    timestamp: ts,
                    trigger,
                    pre_tokens,
                });
            }
            EventKind::Unknown => {}
        }
    }

    fn finish(self, source: &SessionSource<'_>) -> SessionAggregate {
        let tool_calls = self.tools.into_calls();
        let duration_ms = self.span.duration_ms();

        SessionAggregate {
            id: source.id.to_string(),
            project: source.project.to_string(),
            project_hash: source.project_hash.to_string(),
            first_prompt: self.first_prompt,
            model: self.models.primary(),
            tokens: self.usage.tokens,
            estimated_cost_usd: self.usage.cost_usd,
            message_count: self.messages.len() as i64,
            tool_call_count: tool_calls.len() as i64,
            subagent_count: 0,
            turn_count: self.turn_count,
            peak_context_tokens: self.peak_context_tokens,
            started_at: self.span.started_at,
            ended_at: self.span.ended_at,
            duration_ms,
            source_path: source.path.to_string_lossy().to_string(),
            source_mtime: source.mtime.to_string(),
            tool_calls,
            messages: self.messages,
            compactions: self.compactions,
            subagents: Vec::new(),
        }
    }
}

// ============================================
// Per-pass state shared with the sub-agent parser
// ============================================

/// Distinct-message count per model, in first-seen order.
#[derive(Debug, Default)]
pub(crate) struct ModelTally(Vec<(String, usize)>);

impl ModelTally {
    pub(crate) fn record(&mut self, model: &str) {
        match self.0.iter_mut().find(|(m, _)| m == model) {
            Some((_, count)) => *count += 1,
            None => self.0.push((model.to_string(), 1)),
        }
    }

    /// Most frequent model; the earliest seen wins a tie.
    pub(crate) fn primary(&self) -> Option<String> {
        let mut best: Option<&(String, usize)> = None;
        for entry in &self.0 {
            if best.map_or(true, |b| entry.1 > b.1) {
                best = Some(entry);
            }
        }
        best.map(|(model, _)| model.clone())
    }
}

/// Running token totals and cost.
#[derive(Debug, Default)]
pub(crate) struct UsageMeter {
    pub(crate) tokens: TokenTotals,
    pub(crate) cost_usd: f64,
}

impl UsageMeter {
    /// Accumulate one record's usage and return its cost.
    pub(crate) fn add(&mut self, pricing: &PricingTable, model: Option<&str>, usage: &Usage) -> f64 {
        self.tokens.add(usage);
        let cost = pricing.estimate(model.unwrap_or(pricing.default_model()), usage);
        self.cost_usd += cost;
        cost
    }
}

/// First and last timestamps seen in a file.
#[derive(Debug, Default)]
pub(crate) struct TimeSpan {
    pub(crate) started_at: Option<String>,
    pub(crate) ended_at: Option<String>,
}

impl TimeSpan {
    pub(crate) fn observe(&mut self, ts: Option<&str>) {
        if let Some(ts) = ts {
            if self.started_at.is_none() {
                self.started_at = Some(ts.to_string());
            }
            self.ended_at = Some(ts.to_string());
        }
    }

    pub(crate) fn duration_ms(&self) -> Option<i64> {
        match (&self.started_at, &self.ended_at) {
            (Some(start), Some(end)) => elapsed_ms(start, end),
            _ => None,
        }
    }
}

/// Tool calls in the order they were opened, indexed by tool-use id.
#[derive(Debug)]
pub(crate) struct ToolCallLedger {
    calls: Vec<ToolCall>,
    by_id: HashMap<String, usize>,
    subagent_id: Option<String>,
}

impl ToolCallLedger {
    pub(crate) fn new(subagent_id: Option<String>) -> Self {
        Self {
            calls: Vec::new(),
            by_id: HashMap::new(),
            subagent_id,
        }
    }

    /// Record a tool-use block. A repeated id is ignored.
    pub(crate) fn open(&mut self, id: &str, name: &str, input: &Value, ts: &str) {
        if self.by_id.contains_key(id) {
            return;
        }
        self.by_id.insert(id.to_string(), self.calls.len());
        self.calls.push(ToolCall {
            tool_use_id: Some(id.to_string()),
            tool_name: name.to_string(),
            tool_input: Some(truncate(&input.to_string(), MAX_TOOL_PAYLOAD_CHARS)),
            tool_response: None,
            status: ToolStatus::Pending,
            timestamp: ts.to_string(),
            subagent_id: self.subagent_id.clone(),
        });
    }

    /// Resolve calls answered by this user record.
    ///
    /// The top-level `toolUseResult` is checked before `tool_result` blocks.
    pub(crate) fn resolve_from(&mut self, turn: &UserTurn) {
        if let Some((id, result)) = &turn.tool_result {
            self.resolve(id, result.to_string());
        }
        for block in turn.content.blocks() {
            if let ContentBlock::ToolResult {
                tool_use_id,
                content,
            } = block
            {
                let response = match content {
                    Value::String(s) => s.clone(),
                    // an absent payload serializes as an empty JSON string
                    Value::Null => "\"\"".to_string(),
                    other => other.to_string(),
                };
                self.resolve(tool_use_id, response);
            }
        }
    }

    fn resolve(&mut self, id: &str, response: String) {
        let Some(&idx) = self.by_id.get(id) else {
            return;
        };
        let call = &mut self.calls[idx];
        if call.status == ToolStatus::Pending {
            call.status = ToolStatus::Success;
            call.tool_response = Some(truncate(&response, MAX_TOOL_PAYLOAD_CHARS));
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.calls.len()
    }

    pub(crate) fn into_calls(self) -> Vec<ToolCall> {
        self.calls
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_log(lines: &[&str]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file
    }

    fn parse(lines: &[&str]) -> SessionAggregate {
        let file = write_log(lines);
        let source = SessionSource {
            id: "sess-1",
            project: "work/app",
            project_hash: "-Users-me-work-app",
            path: file.path(),
            mtime: "2025-01-01T00:00:00+00:00",
        };
        parse_session(&source, &PricingTable::builtin()).unwrap()
    }

    fn assistant(ts: &str, id: &str, model: &str, usage: &str, content: &str) -> String {
        format!(
            r#"{{"type":"assistant","timestamp":"{ts}","message":{{"id":"{id}","model":"{model}","usage":{usage},"content":{content}}}}}"#
        )
    }

    fn user_text(ts: &str, text: &str) -> String {
        format!(
            r#"{{"type":"user","userType":"external","timestamp":"{ts}","message":{{"role":"user","content":{}}}}}"#,
            serde_json::to_string(text).unwrap()
        )
    }

    #[test]
    fn test_duplicate_message_ids_count_usage_twice() {
        let usage = r#"{"input_tokens":100,"output_tokens":50}"#;
        let content = r#"[{"type":"text","text":"Reading it"},{"type":"tool_use","id":"read_file","name":"Read","input":{"file_path":"/a.ts"}}]"#;
        let first = assistant("2025-01-01T00:00:00Z", "m1", "claude-sonnet-4-6", usage, content);
        let second = assistant("2025-01-01T00:00:01Z", "m1", "claude-sonnet-4-6", usage, content);
        let result = r#"{"type":"user","userType":"external","timestamp":"2025-01-01T00:00:02Z","message":{"role":"user","content":[{"type":"tool_result","tool_use_id":"read_file","content":"export const a = 1;"}]}}"#;
        let done = user_text("2025-01-01T00:00:05Z", "done");

        let session = parse(&[&first, &second, result, &done]);

        let assistant_messages: Vec<_> = session
            .messages
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .collect();
        assert_eq!(assistant_messages.len(), 1);
        assert_eq!(session.message_count, 2);
        assert_eq!(session.tokens.input_tokens, 200);
        assert_eq!(session.tokens.output_tokens, 100);
        assert_eq!(session.turn_count, 1);
        assert_eq!(session.model.as_deref(), Some("claude-sonnet-4-6"));

        assert_eq!(session.tool_calls.len(), 1);
        let call = &session.tool_calls[0];
        assert_eq!(call.tool_name, "Read");
        assert_eq!(call.status, ToolStatus::Success);
        assert_eq!(call.tool_response.as_deref(), Some("export const a = 1;"));
        assert!(call.tool_input.as_deref().unwrap().contains("/a.ts"));
        assert!(call.subagent_id.is_none());

        // 200 in * $3 + 100 out * $15, per million
        let expected = (200.0 * 3.0 + 100.0 * 15.0) / 1_000_000.0;
        assert!((session.estimated_cost_usd - expected).abs() < 1e-12);
        assert_eq!(session.duration_ms, Some(5_000));
        assert_eq!(session.first_prompt.as_deref(), Some("done"));
    }

    #[test]
    fn test_first_result_wins() {
        let open = assistant(
            "t1",
            "m1",
            "claude-opus-4-6",
            "{}",
            r#"[{"type":"tool_use","id":"tu","name":"Bash","input":{"command":"ls"}}]"#,
        );
        let top_level = r#"{"type":"user","timestamp":"t2","toolUseID":"tu","toolUseResult":{"stdout":"first"},"message":{"content":[{"type":"tool_result","tool_use_id":"tu","content":"second"}]}}"#;
        let again = r#"{"type":"user","timestamp":"t3","message":{"content":[{"type":"tool_result","tool_use_id":"tu","content":"third"}]}}"#;
        let unknown = r#"{"type":"user","timestamp":"t4","message":{"content":[{"type":"tool_result","tool_use_id":"nope","content":"x"}]}}"#;

        let session = parse(&[&open, top_level, again, unknown]);
        assert_eq!(session.tool_calls.len(), 1);
        assert_eq!(
            session.tool_calls[0].tool_response.as_deref(),
            Some(r#"{"stdout":"first"}"#)
        );
    }

    #[test]
    fn test_null_tool_result_content() {
        let open = assistant(
            "t1",
            "m1",
            "claude-opus-4-6",
            "{}",
            r#"[{"type":"tool_use","id":"f1","name":"WebFetch","input":{"url":"https://x.dev"}},{"type":"tool_use","id":"f2","name":"WebFetch","input":{}}]"#,
        );
        let null = r#"{"type":"user","timestamp":"t2","message":{"content":[{"type":"tool_result","tool_use_id":"f1","content":null},{"type":"tool_result","tool_use_id":"f2"}]}}"#;

        let session = parse(&[&open, null]);
        for call in &session.tool_calls {
            assert_eq!(call.status, ToolStatus::Success);
            assert_eq!(call.tool_response.as_deref(), Some(r#""""#));
            assert_eq!(
                crate::analytics::insights::classify_web_fetch(call.tool_response.as_deref()),
                None
            );
        }
    }

    #[test]
    fn test_bare_string_assistant_content_is_not_a_message() {
        let bare = r#"{"type":"assistant","timestamp":"t1","message":{"id":"m1","model":"claude-opus-4-6","usage":{"input_tokens":7},"content":"plain"}}"#;
        let session = parse(&[&user_text("t0", "go"), bare]);

        assert_eq!(session.message_count, 1);
        assert_eq!(session.messages[0].role, Role::User);
        assert_eq!(session.turn_count, 1);
        assert_eq!(session.tokens.input_tokens, 7);
    }

    #[test]
    fn test_null_usage_counter_keeps_the_record() {
        let open = assistant(
            "t1",
            "m1",
            "claude-sonnet-4-6",
            r#"{"input_tokens":100,"cache_creation_input_tokens":null}"#,
            r#"[{"type":"text","text":"Reading"},{"type":"tool_use","id":"r","name":"Read","input":{}}]"#,
        );
        let session = parse(&[&open]);
        assert_eq!(session.tokens.input_tokens, 100);
        assert_eq!(session.tool_calls.len(), 1);
        assert_eq!(session.message_count, 1);
    }

    #[test]
    fn test_pending_calls_stay_pending() {
        let open = assistant(
            "t1",
            "m1",
            "claude-opus-4-6",
            "{}",
            r#"[{"type":"tool_use","id":"a","name":"Read","input":{}},{"type":"tool_use","id":"a","name":"Read","input":{}},{"type":"tool_use","id":"b","name":"Grep","input":{}}]"#,
        );
        let session = parse(&[&open]);
        assert_eq!(session.tool_call_count, 2);
        assert!(session
            .tool_calls
            .iter()
            .all(|c| c.status == ToolStatus::Pending && c.tool_response.is_none()));
    }

    #[test]
    fn test_turn_counting_ignores_tool_results() {
        let text = r#"[{"type":"text","text":"ok"}]"#;
        let tool_result = r#"{"type":"user","timestamp":"t","message":{"content":[{"type":"tool_result","tool_use_id":"x","content":"r"}]}}"#;
        let lines = [
            user_text("t0", "start"),
            assistant("t1", "a1", "claude-opus-4-6", "{}", text),
            tool_result.to_string(),
            assistant("t2", "a2", "claude-opus-4-6", "{}", text),
            user_text("t3", "next"),
            assistant("t4", "a3", "claude-opus-4-6", "{}", text),
        ];
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let session = parse(&refs);
        assert_eq!(session.turn_count, 2);
    }

    #[test]
    fn test_prompt_cleaning_and_skips() {
        let caveat = user_text(
            "t0",
            "<local-command-caveat>Caveat: ignore</local-command-caveat>",
        );
        let real = user_text(
            "t1",
            "<system-reminder>be nice</system-reminder>  Fix the flaky test ",
        );
        let session = parse(&[&caveat, "not json at all", "", &real, r#"{"type":"summary"}"#]);

        assert_eq!(session.first_prompt.as_deref(), Some("Fix the flaky test"));
        assert_eq!(session.message_count, 1);
        assert_eq!(session.started_at.as_deref(), Some("t0"));
        // Non-RFC 3339 timestamps give no duration
        assert_eq!(session.duration_ms, None);
    }

    #[test]
    fn test_peak_context_and_compactions() {
        let small = assistant(
            "2025-01-01T00:00:00Z",
            "a1",
            "claude-opus-4-6",
            r#"{"input_tokens":10,"cache_read_input_tokens":1000,"cache_creation_input_tokens":500,"output_tokens":9999}"#,
            "[]",
        );
        let large = assistant(
            "2025-01-01T00:01:00Z",
            "a2",
            "claude-opus-4-6",
            r#"{"input_tokens":5,"cache_read_input_tokens":90000,"cache_creation_input_tokens":0,"output_tokens":1}"#,
            "[]",
        );
        let compact = r#"{"type":"system","subtype":"compact_boundary","timestamp":"2025-01-01T00:02:00Z","compactMetadata":{"trigger":"manual","preTokens":120000}}"#;

        let session = parse(&[&small, &large, compact]);
        assert_eq!(session.peak_context_tokens, 90_005);
        assert_eq!(session.compactions.len(), 1);
        assert_eq!(session.compactions[0].trigger, "manual");
        assert_eq!(session.compactions[0].pre_tokens, 120_000);
        assert_eq!(session.duration_ms, Some(120_000));
    }

    #[test]
    fn test_primary_model_tie_goes_to_first_seen() {
        let mut tally = ModelTally::default();
        tally.record("claude-haiku-4-5");
        tally.record("claude-opus-4-6");
        tally.record("claude-opus-4-6");
        tally.record("claude-haiku-4-5");
        assert_eq!(tally.primary().as_deref(), Some("claude-haiku-4-5"));

        tally.record("claude-opus-4-6");
        assert_eq!(tally.primary().as_deref(), Some("claude-opus-4-6"));
        assert_eq!(ModelTally::default().primary(), None);
    }

    #[test]
    fn test_long_tool_input_is_truncated() {
        let big = "x".repeat(3000);
        let content = format!(
            r#"[{{"type":"tool_use","id":"w","name":"Write","input":{{"content":"{big}"}}}}]"#
        );
        let open = assistant("t", "m", "claude-opus-4-6", "{}", &content);
        let session = parse(&[&open]);
        let input = session.tool_calls[0].tool_input.as_deref().unwrap();
        assert_eq!(input.chars().count(), MAX_TOOL_PAYLOAD_CHARS + 3);
        assert!(input.ends_with("..."));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let source = SessionSource {
            id: "gone",
            project: "p",
            project_hash: "p",
            path: Path::new("/definitely/not/here.jsonl"),
            mtime: "",
        };
        assert!(parse_session(&source, &PricingTable::builtin()).is_err());
    }
}
