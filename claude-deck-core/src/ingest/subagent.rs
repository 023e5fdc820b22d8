//! Sub-agent log parser
//!
//! Parses `<project>/<session-id>/subagents/<agent-id>.jsonl`. This is the
//! session pass cut down to usage, cost, and tool calls, plus the prompt the
//! sub-agent was given and the last thing it said. Sub-agent logs have no
//! compactions or turns of their own.

use super::record::{ContentBlock, EventKind};
use super::session::{for_each_event, ModelTally, TimeSpan, ToolCallLedger, UsageMeter};
use super::text::clip;
use crate::error::Result;
use crate::pricing::PricingTable;
use crate::types::{SubagentAggregate, ToolCall};
use std::collections::HashSet;
use std::path::Path;

/// Cap for the stored prompt and result summary.
pub const MAX_SUBAGENT_TEXT_CHARS: usize = 500;

/// A parsed sub-agent and the tool calls it made, tagged with its id.
#[derive(Debug)]
pub struct SubagentParse {
    pub subagent: SubagentAggregate,
    pub tool_calls: Vec<ToolCall>,
}

/// Guess what kind of agent was spawned from its prompt.
///
/// | Prompt mentions | Type |
/// |-----------------|------|
/// | `explore` or `search` | `Explore` |
/// | `plan` | `Plan` |
/// | anything else | `general-purpose` |
pub fn classify_agent_type(prompt: &str) -> &'static str {
    let lower = prompt.to_lowercase();
    if lower.contains("explore") || lower.contains("search") {
        "Explore"
    } else if lower.contains("plan") {
        "Plan"
    } else {
        "general-purpose"
    }
}

/// Parse one sub-agent log.
pub fn parse_subagent(
    path: &Path,
    agent_id: &str,
    session_id: &str,
    pricing: &PricingTable,
) -> Result<SubagentParse> {
    let mut seen_message_ids = HashSet::new();
    let mut models = ModelTally::default();
    let mut tools = ToolCallLedger::new(Some(agent_id.to_string()));
    let mut usage = UsageMeter::default();
    let mut span = TimeSpan::default();
    let mut prompt: Option<String> = None;
    let mut last_text: Option<String> = None;

    for_each_event(path, |event| {
        span.observe(event.timestamp.as_deref());
        let ts = event.timestamp.unwrap_or_default();

        match event.kind {
            EventKind::Assistant(turn) => {
                let already_seen = match &turn.message_id {
                    Some(id) => !seen_message_ids.insert(id.clone()),
                    None => false,
                };
                if !already_seen {
                    if let Some(model) = &turn.model {
                        models.record(model);
                    }
                }
                if let Some(u) = &turn.usage {
                    usage.add(pricing, turn.model.as_deref(), u);
                }
                for block in turn.content.blocks() {
                    match block {
                        ContentBlock::ToolUse { id, name, input } => {
                            tools.open(id, name, input, &ts);
                        }
                        ContentBlock::Text { text } => last_text = Some(text.clone()),
                        _ => {}
                    }
                }
            }
            EventKind::User(turn) => {
                if prompt.is_none() && turn.external {
                    let text = turn.content.text();
                    if !text.is_empty() {
                        prompt = Some(clip(&text, MAX_SUBAGENT_TEXT_CHARS));
                    }
                }
                tools.resolve_from(&turn);
            }
            EventKind::Compaction { .. } | EventKind::Unknown => {}
        }
    })?;

    let tool_call_count = tools.len() as i64;
    let subagent = SubagentAggregate {
        id: agent_id.to_string(),
        session_id: session_id.to_string(),
        agent_type: prompt.as_deref().map(|p| classify_agent_type(p).to_string()),
        model: models.primary(),
        prompt,
        tokens: usage.tokens,
        estimated_cost_usd: usage.cost_usd,
        tool_call_count,
        duration_ms: span.duration_ms(),
        result_summary: last_text.map(|t| clip(&t, MAX_SUBAGENT_TEXT_CHARS)),
    };

    Ok(SubagentParse {
        subagent,
        tool_calls: tools.into_calls(),
    })
}
