//! Session Insights
//!
//! Derives behavioral patterns from one session's merged timeline. Nothing
//! here is stored; insights are recomputed from the timeline on request.
//!
//! ## Insights Produced
//!
//! | Insight | Description |
//! |---------|-------------|
//! | `phases` | Top-level tool calls grouped by activity category, with duration and attributed cost |
//! | `file_reads` | Files `Read` 2+ times, most-read first |
//! | `web_fetches` | WebFetch/WebSearch calls with error classification and success rate |
//! | `tool_distribution` | Tool name → call count, most used first |
//! | `compaction` | Context compaction count and events |
//!
//! ## Activity Categories
//!
//! | Category | Label | Tools |
//! |----------|-------|-------|
//! | `explore` | Exploration | Read, Glob, Grep, Explore |
//! | `research` | Research | WebFetch, WebSearch |
//! | `write` | Writing | Write, Edit, NotebookEdit |
//! | `execute` | Execution | Bash |
//! | `other` | Other | everything else |
//!
//! ## Phases
//!
//! Consecutive top-level tool calls in the same category form a run. A run
//! lasts from its first call to its last (zero for a single call). Runs are
//! then summed per category, in order of first appearance, so the output has
//! at most one entry per category.
//!
//! ## Cost Attribution
//!
//! Each assistant message opens a turn. The message's cost is split evenly
//! over the tool calls that follow it until the next assistant message.
//! Turns with no tool calls, or no cost, attribute nothing.

use crate::ingest::record::is_truthy;
use crate::types::{elapsed_ms, Compaction, Role, TimelineEntry, ToolCall};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// Minimum reads of one file to be reported.
const REREAD_THRESHOLD: usize = 2;

/// Unstructured responses at least this long are never flagged as errors.
const ERROR_HEURISTIC_MAX_CHARS: usize = 200;

/// Length of the excerpt kept for heuristically detected errors.
const ERROR_EXCERPT_CHARS: usize = 100;

const ERROR_WORDS: &[&str] = &["error", "failed", "timeout"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    Explore,
    Research,
    Write,
    Execute,
    Other,
}

impl ToolCategory {
    pub fn of(tool_name: &str) -> Self {
        match tool_name {
            "Read" | "Glob" | "Grep" | "Explore" => ToolCategory::Explore,
            "WebFetch" | "WebSearch" => ToolCategory::Research,
            "Write" | "Edit" | "NotebookEdit" => ToolCategory::Write,
            "Bash" => ToolCategory::Execute,
            _ => ToolCategory::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolCategory::Explore => "explore",
            ToolCategory::Research => "research",
            ToolCategory::Write => "write",
            ToolCategory::Execute => "execute",
            ToolCategory::Other => "other",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ToolCategory::Explore => "Exploration",
            ToolCategory::Research => "Research",
            ToolCategory::Write => "Writing",
            ToolCategory::Execute => "Execution",
            ToolCategory::Other => "Other",
        }
    }
}

/// A maximal run of same-category top-level tool calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseRun {
    pub category: ToolCategory,
    pub tool_count: usize,
    pub duration_ms: i64,
}

/// All runs of one category, summed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionPhase {
    pub name: &'static str,
    pub category: ToolCategory,
    pub tool_count: usize,
    pub duration_ms: i64,
    pub cost_usd: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileReadPattern {
    pub file: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebFetchDetail {
    pub tool: String,
    /// url, else query, else `(unknown)`
    pub url: String,
    pub timestamp: String,
    pub is_error: bool,
    pub error_detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebFetchSummary {
    pub total: usize,
    pub errors: usize,
    /// `(total - errors) / total`, or 1 when there were no fetches
    pub success_rate: f64,
    pub details: Vec<WebFetchDetail>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolCount {
    pub tool: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompactionSummary {
    pub count: usize,
    pub compactions: Vec<Compaction>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionInsights {
    pub file_reads: Vec<FileReadPattern>,
    pub phases: Vec<SessionPhase>,
    pub web_fetches: WebFetchSummary,
    pub tool_distribution: Vec<ToolCount>,
    pub total_tool_calls: usize,
    pub session_duration_ms: i64,
    pub compaction: CompactionSummary,
}

/// Compute all insights for a session.
///
/// `timeline` must already be ordered by timestamp.
pub fn compute_insights(
    timeline: &[TimelineEntry],
    compactions: &[Compaction],
    session_duration_ms: i64,
) -> SessionInsights {
    let calls: Vec<&ToolCall> = timeline
        .iter()
        .filter_map(|e| match e {
            TimelineEntry::ToolCall(c) => Some(c),
            TimelineEntry::Message(_) => None,
        })
        .collect();

    let top_level: Vec<&ToolCall> = calls
        .iter()
        .copied()
        .filter(|c| c.subagent_id.is_none())
        .collect();
    let costs = cost_by_category(timeline);
    let phases = summarize_phases(&segment_phases(&top_level), &costs);

    let mut compactions = compactions.to_vec();
    compactions.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

    SessionInsights {
        file_reads: file_read_patterns(&calls),
        phases,
        web_fetches: web_fetch_summary(&calls),
        tool_distribution: tool_distribution(&calls),
        total_tool_calls: calls.len(),
        session_duration_ms,
        compaction: CompactionSummary {
            count: compactions.len(),
            compactions,
        },
    }
}

/// Split time-ordered tool calls into runs of the same category.
pub fn segment_phases(calls: &[&ToolCall]) -> Vec<PhaseRun> {
    let mut runs = Vec::new();
    let Some(first) = calls.first() else {
        return runs;
    };

    let mut category = ToolCategory::of(&first.tool_name);
    let mut start = first.timestamp.as_str();
    let mut end = start;
    let mut count = 0usize;

    for call in calls {
        let next = ToolCategory::of(&call.tool_name);
        if next != category {
            runs.push(PhaseRun {
                category,
                tool_count: count,
                duration_ms: elapsed_ms(start, end).unwrap_or(0),
            });
            category = next;
            start = &call.timestamp;
            count = 0;
        }
        end = &call.timestamp;
        count += 1;
    }
    runs.push(PhaseRun {
        category,
        tool_count: count,
        duration_ms: elapsed_ms(start, end).unwrap_or(0),
    });

    runs
}

/// Collapse runs into one entry per category, in first-appearance order.
pub fn summarize_phases(
    runs: &[PhaseRun],
    costs: &HashMap<ToolCategory, f64>,
) -> Vec<SessionPhase> {
    let mut phases: Vec<SessionPhase> = Vec::new();
    for run in runs {
        match phases.iter_mut().find(|p| p.category == run.category) {
            Some(phase) => {
                phase.tool_count += run.tool_count;
                phase.duration_ms += run.duration_ms;
            }
            None => phases.push(SessionPhase {
                name: run.category.label(),
                category: run.category,
                tool_count: run.tool_count,
                duration_ms: run.duration_ms,
                cost_usd: costs.get(&run.category).copied().unwrap_or(0.0),
            }),
        }
    }
    phases
}

/// Attribute each assistant message's cost to the tool calls that follow it.
pub fn cost_by_category(timeline: &[TimelineEntry]) -> HashMap<ToolCategory, f64> {
    let mut totals: HashMap<ToolCategory, f64> = HashMap::new();
    let mut turn_cost = 0.0;
    let mut turn_tools: Vec<ToolCategory> = Vec::new();

    let mut flush = |cost: f64, tools: &mut Vec<ToolCategory>| {
        if cost > 0.0 && !tools.is_empty() {
            let share = cost / tools.len() as f64;
            for category in tools.iter() {
                *totals.entry(*category).or_insert(0.0) += share;
            }
        }
        tools.clear();
    };

    for entry in timeline {
        match entry {
            TimelineEntry::Message(m) if m.role == Role::Assistant => {
                flush(turn_cost, &mut turn_tools);
                turn_cost = m.cost_usd.unwrap_or(0.0);
            }
            TimelineEntry::ToolCall(c) => turn_tools.push(ToolCategory::of(&c.tool_name)),
            TimelineEntry::Message(_) => {}
        }
    }
    flush(turn_cost, &mut turn_tools);

    totals
}

/// Files read at least twice, most-read first. Ties keep first-read order.
pub fn file_read_patterns(calls: &[&ToolCall]) -> Vec<FileReadPattern> {
    let mut counts: Vec<FileReadPattern> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for call in calls.iter().filter(|c| c.tool_name == "Read") {
        let Some(file) = call
            .tool_input
            .as_deref()
            .and_then(|input| serde_json::from_str::<Value>(input).ok())
            .and_then(|input| input.get("file_path")?.as_str().map(str::to_string))
        else {
            continue;
        };
        match index.get(&file) {
            Some(&i) => counts[i].count += 1,
            None => {
                index.insert(file.clone(), counts.len());
                counts.push(FileReadPattern { file, count: 1 });
            }
        }
    }

    counts.retain(|p| p.count >= REREAD_THRESHOLD);
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts
}

/// Error detail for a web tool response, or `None` if it looks successful.
///
/// - no response → `"No response"`
/// - JSON with a truthy `error` or `is_error: true` → `error`, else `message`, else `"Failed"`
/// - short non-JSON text mentioning an error word → its first 100 characters
pub fn classify_web_fetch(response: Option<&str>) -> Option<String> {
    let response = match response {
        Some(r) if !r.is_empty() => r,
        _ => return Some("No response".to_string()),
    };

    match serde_json::from_str::<Value>(response) {
        Ok(value) => {
            let error = value.get("error").filter(|e| is_truthy(e));
            let flagged = value.get("is_error") == Some(&Value::Bool(true));
            if error.is_none() && !flagged {
                return None;
            }
            let detail = error
                .or_else(|| value.get("message").filter(|m| is_truthy(m)))
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .unwrap_or_else(|| "Failed".to_string());
            Some(detail)
        }
        Err(_) if looks_like_error(response) => {
            Some(response.chars().take(ERROR_EXCERPT_CHARS).collect())
        }
        Err(_) => None,
    }
}

/// Short unstructured text that mentions an error word.
///
/// Long responses are never flagged; they are usually page content that
/// happens to discuss errors.
pub fn looks_like_error(text: &str) -> bool {
    if text.chars().count() >= ERROR_HEURISTIC_MAX_CHARS {
        return false;
    }
    let lower = text.to_lowercase();
    ERROR_WORDS.iter().any(|w| lower.contains(w))
}

fn web_fetch_summary(calls: &[&ToolCall]) -> WebFetchSummary {
    let details: Vec<WebFetchDetail> = calls
        .iter()
        .filter(|c| ToolCategory::of(&c.tool_name) == ToolCategory::Research)
        .map(|c| {
            let error = classify_web_fetch(c.tool_response.as_deref());
            WebFetchDetail {
                tool: c.tool_name.clone(),
                url: fetch_target(c.tool_input.as_deref()),
                timestamp: c.timestamp.clone(),
                is_error: error.is_some(),
                error_detail: error.unwrap_or_default(),
            }
        })
        .collect();

    let total = details.len();
    let errors = details.iter().filter(|d| d.is_error).count();
    let success_rate = if total == 0 {
        1.0
    } else {
        (total - errors) as f64 / total as f64
    };

    WebFetchSummary {
        total,
        errors,
        success_rate,
        details,
    }
}

/// url, else query, else `(unknown)`.
fn fetch_target(input: Option<&str>) -> String {
    let parsed = input.and_then(|i| serde_json::from_str::<Value>(i).ok());
    let field = |name: &str| {
        parsed
            .as_ref()
            .and_then(|v| v.get(name))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    field("url")
        .or_else(|| field("query"))
        .unwrap_or_else(|| "(unknown)".to_string())
}

fn tool_distribution(calls: &[&ToolCall]) -> Vec<ToolCount> {
    let mut counts: HashMap<&str, i64> = HashMap::new();
    for call in calls {
        *counts.entry(call.tool_name.as_str()).or_insert(0) += 1;
    }

    let mut distribution: Vec<ToolCount> = counts
        .into_iter()
        .map(|(tool, count)| ToolCount {
            tool: tool.to_string(),
            count,
        })
        .collect();
    distribution.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.tool.cmp(&b.tool)));
    distribution
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{merge_timeline, Message, ToolStatus};

    fn call(name: &str, ts: &str, input: &str, response: Option<&str>) -> ToolCall {
        ToolCall {
            tool_use_id: None,
            tool_name: name.to_string(),
            tool_input: Some(input.to_string()),
            tool_response: response.map(str::to_string),
            status: if response.is_some() {
                ToolStatus::Success
            } else {
                ToolStatus::Pending
            },
            timestamp: ts.to_string(),
            subagent_id: None,
        }
    }

    fn tool(name: &str, ts: &str) -> TimelineEntry {
        TimelineEntry::ToolCall(call(name, ts, "{}", Some("ok")))
    }

    fn assistant(ts: &str, cost: f64) -> TimelineEntry {
        TimelineEntry::Message(Message {
            role: Role::Assistant,
            content: "...".into(),
            timestamp: ts.into(),
            model: None,
            cost_usd: Some(cost),
        })
    }

    fn ts(secs: u32) -> String {
        format!("2025-01-01T00:{:02}:{:02}.000Z", secs / 60, secs % 60)
    }

    #[test]
    fn test_categories() {
        assert_eq!(ToolCategory::of("Grep"), ToolCategory::Explore);
        assert_eq!(ToolCategory::of("WebSearch"), ToolCategory::Research);
        assert_eq!(ToolCategory::of("NotebookEdit"), ToolCategory::Write);
        assert_eq!(ToolCategory::of("Bash"), ToolCategory::Execute);
        assert_eq!(ToolCategory::of("Task"), ToolCategory::Other);
        assert_eq!(ToolCategory::of("mcp__github__search"), ToolCategory::Other);
        assert_eq!(ToolCategory::Write.label(), "Writing");
    }

    #[test]
    fn test_phases_collapse_runs_per_category() {
        let entries = vec![
            tool("Read", &ts(0)),
            tool("Grep", &ts(10)),
            tool("Edit", &ts(20)),
            tool("Read", &ts(30)),
            tool("Glob", &ts(45)),
            tool("Bash", &ts(50)),
        ];
        let insights = compute_insights(&entries, &[], 50_000);

        let summary: Vec<(&str, usize, i64)> = insights
            .phases
            .iter()
            .map(|p| (p.name, p.tool_count, p.duration_ms))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("Exploration", 4, 10_000 + 15_000),
                ("Writing", 1, 0),
                ("Execution", 1, 0)
            ]
        );
        let phase_total: usize = insights.phases.iter().map(|p| p.tool_count).sum();
        assert_eq!(phase_total, insights.total_tool_calls);
    }

    #[test]
    fn test_subagent_calls_are_not_phases() {
        let mut nested = call("Bash", &ts(5), "{}", Some("ok"));
        nested.subagent_id = Some("agent-1".into());
        let entries = vec![tool("Read", &ts(0)), TimelineEntry::ToolCall(nested)];

        let insights = compute_insights(&entries, &[], 0);
        assert_eq!(insights.phases.len(), 1);
        assert_eq!(insights.phases[0].tool_count, 1);
        assert_eq!(insights.total_tool_calls, 2);
    }

    #[test]
    fn test_cost_split_across_following_calls() {
        let entries = vec![
            tool("Read", &ts(0)), // before any assistant message
            assistant(&ts(1), 0.30),
            tool("Read", &ts(2)),
            tool("Edit", &ts(3)),
            tool("Bash", &ts(4)),
            assistant(&ts(5), 1.0), // no following calls
            assistant(&ts(6), 0.0),
            tool("Bash", &ts(7)),
        ];
        let costs = cost_by_category(&entries);

        assert!((costs[&ToolCategory::Explore] - 0.10).abs() < 1e-12);
        assert!((costs[&ToolCategory::Write] - 0.10).abs() < 1e-12);
        assert!((costs[&ToolCategory::Execute] - 0.10).abs() < 1e-12);
        assert_eq!(costs.len(), 3);

        let insights = compute_insights(&entries, &[], 0);
        let write = insights
            .phases
            .iter()
            .find(|p| p.category == ToolCategory::Write)
            .unwrap();
        assert!((write.cost_usd - 0.10).abs() < 1e-12);
    }

    #[test]
    fn test_cost_ignores_calls_sharing_the_message_timestamp() {
        let message = |t: u32, cost: f64| Message {
            role: Role::Assistant,
            content: "...".into(),
            timestamp: ts(t),
            model: None,
            cost_usd: Some(cost),
        };
        let entries = merge_timeline(
            vec![
                call("Bash", &ts(1), "{}", Some("ok")),
                call("Read", &ts(2), "{}", Some("ok")),
            ],
            vec![message(1, 1.0), message(2, 3.0)],
        );
        assert!(matches!(entries[0], TimelineEntry::ToolCall(_)));

        let costs = cost_by_category(&entries);
        assert_eq!(costs.get(&ToolCategory::Execute), None);
        assert!((costs[&ToolCategory::Explore] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_file_reads() {
        let read = |file: &str, t: u32| {
            TimelineEntry::ToolCall(call(
                "Read",
                &ts(t),
                &format!(r#"{{"file_path":"{file}"}}"#),
                Some("..."),
            ))
        };
        let entries = vec![
            read("/x.ts", 0),
            read("/y.ts", 1),
            read("/x.ts", 2),
            read("/once.ts", 3),
            read("/y.ts", 4),
            read("/x.ts", 5),
            TimelineEntry::ToolCall(call("Read", &ts(6), r#"{"file_path":"/x.ts"..."#, None)),
            TimelineEntry::ToolCall(call("Edit", &ts(7), r#"{"file_path":"/once.ts"}"#, None)),
        ];
        let insights = compute_insights(&entries, &[], 0);

        assert_eq!(
            insights.file_reads,
            vec![
                FileReadPattern {
                    file: "/x.ts".into(),
                    count: 3
                },
                FileReadPattern {
                    file: "/y.ts".into(),
                    count: 2
                },
            ]
        );
    }

    #[test]
    fn test_classify_web_fetch() {
        assert_eq!(classify_web_fetch(None).as_deref(), Some("No response"));
        assert_eq!(classify_web_fetch(Some("")).as_deref(), Some("No response"));

        let timeout = classify_web_fetch(Some("Request timeout")).unwrap();
        assert!(timeout.contains("timeout"));

        assert_eq!(
            classify_web_fetch(Some(r#"{"error":"403 Forbidden"}"#)).as_deref(),
            Some("403 Forbidden")
        );
        assert_eq!(
            classify_web_fetch(Some(r#"{"is_error":true,"message":"blocked"}"#)).as_deref(),
            Some("blocked")
        );
        assert_eq!(
            classify_web_fetch(Some(r#"{"is_error":true}"#)).as_deref(),
            Some("Failed")
        );
        // Structured responses are judged only by their error fields
        assert_eq!(
            classify_web_fetch(Some(r#"{"result":"error handling guide","is_error":false}"#)),
            None
        );

        let article = format!("How to handle errors in Rust. {}", "a".repeat(300));
        assert_eq!(classify_web_fetch(Some(&article)), None);
        assert_eq!(classify_web_fetch(Some("Fetched 12kb of docs")), None);
    }

    #[test]
    fn test_error_excerpt_is_capped() {
        let text = format!("failed: {}", "x".repeat(150));
        assert_eq!(classify_web_fetch(Some(&text)).unwrap().chars().count(), 100);
    }

    #[test]
    fn test_web_fetch_summary() {
        let entries = vec![
            TimelineEntry::ToolCall(call(
                "WebFetch",
                &ts(0),
                r#"{"url":"https://docs.rs"}"#,
                Some("Request timeout"),
            )),
            TimelineEntry::ToolCall(call(
                "WebSearch",
                &ts(1),
                r#"{"query":"rusqlite transaction"}"#,
                Some(r#"{"results":[]}"#),
            )),
            TimelineEntry::ToolCall(call("WebFetch", &ts(2), "{}", None)),
            TimelineEntry::ToolCall(call(
                "WebFetch",
                &ts(3),
                r#"{"url":"https://a.dev"}"#,
                Some("<html>ok</html>"),
            )),
        ];
        let web = compute_insights(&entries, &[], 0).web_fetches;

        assert_eq!(web.total, 4);
        assert_eq!(web.errors, 2);
        assert!((web.success_rate - 0.5).abs() < 1e-12);
        assert_eq!(web.details[0].url, "https://docs.rs");
        assert!(web.details[0].is_error);
        assert_eq!(web.details[1].url, "rusqlite transaction");
        assert_eq!(web.details[2].url, "(unknown)");
        assert_eq!(web.details[2].error_detail, "No response");
    }

    #[test]
    fn test_empty_session() {
        let insights = compute_insights(&[], &[], 0);
        assert_eq!(insights.web_fetches.success_rate, 1.0);
        assert!(insights.phases.is_empty());
        assert!(insights.file_reads.is_empty());
        assert_eq!(insights.compaction.count, 0);
    }

    #[test]
    fn test_tool_distribution_and_compactions() {
        let entries = vec![
            tool("Read", &ts(0)),
            tool("Bash", &ts(1)),
            tool("Read", &ts(2)),
            tool("Edit", &ts(3)),
        ];
        let compactions = vec![
            Compaction {
                timestamp: ts(9),
                trigger: "manual".into(),
                pre_tokens: 90_000,
            },
            Compaction {
                timestamp: ts(4),
                trigger: "auto".into(),
                pre_tokens: 160_000,
            },
        ];
        let insights = compute_insights(&entries, &compactions, 9_000);

        let dist: Vec<(&str, i64)> = insights
            .tool_distribution
            .iter()
            .map(|t| (t.tool.as_str(), t.count))
            .collect();
        assert_eq!(dist, vec![("Read", 2), ("Bash", 1), ("Edit", 1)]);
        assert_eq!(insights.compaction.count, 2);
        assert_eq!(insights.compaction.compactions[0].trigger, "auto");
        assert_eq!(insights.session_duration_ms, 9_000);
    }
}
