//! Database repository layer
//!
//! Write path: [`Database::replace_session`] swaps a session and everything
//! parsed out of it in one transaction. Read path: session lists, detail,
//! timeline, sub-agents, aggregate stats and insights.

use crate::analytics::insights::{compute_insights, SessionInsights, ToolCount};
use crate::error::{Error, Result};
use crate::types::*;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

/// Context window assumed when computing peak-context percentages.
pub const DEFAULT_CONTEXT_WINDOW_TOKENS: i64 = 200_000;

/// Default page size for session lists.
pub const DEFAULT_SESSION_LIMIT: usize = 50;

/// Number of tools reported in [`Stats::top_tools`].
const TOP_TOOLS_LIMIT: i64 = 15;

/// A stored session as shown in lists and detail views.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionRow {
    pub id: String,
    pub project: String,
    pub project_hash: String,
    pub first_prompt: Option<String>,
    pub model: Option<String>,
    pub tokens: TokenTotals,
    pub estimated_cost_usd: f64,
    pub message_count: i64,
    pub tool_call_count: i64,
    pub subagent_count: i64,
    pub turn_count: i64,
    pub peak_context_tokens: i64,
    /// Peak context (or largest pre-compaction size, if higher) as a
    /// percentage of the context window, one decimal place
    pub peak_context_pct: f64,
    pub compaction_count: i64,
    pub started_at: Option<String>,
    pub ended_at: Option<String>,
    pub duration_ms: Option<i64>,
    pub source_path: String,
    pub synced_at: String,
}

/// Sort key for session lists. Always descending.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionSort {
    #[default]
    Date,
    Cost,
    Tokens,
    Duration,
}

impl SessionSort {
    fn order_by(&self) -> &'static str {
        match self {
            SessionSort::Date => "s.started_at DESC NULLS LAST",
            SessionSort::Cost => "s.estimated_cost_usd DESC",
            SessionSort::Tokens => {
                "(s.input_tokens + s.output_tokens + s.cache_read_tokens + s.cache_create_tokens) DESC"
            }
            SessionSort::Duration => "s.duration_ms DESC NULLS LAST",
        }
    }
}

impl std::str::FromStr for SessionSort {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "date" => Ok(SessionSort::Date),
            "cost" => Ok(SessionSort::Cost),
            "tokens" => Ok(SessionSort::Tokens),
            "duration" => Ok(SessionSort::Duration),
            _ => Err(format!(
                "unknown sort key: {} (expected date, cost, tokens or duration)",
                s
            )),
        }
    }
}

/// Filter for session queries
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    /// Substring of the project display name
    pub project: Option<String>,
    /// Substring of the primary model id
    pub model: Option<String>,
    /// Sessions started at or after this ISO-8601 time
    pub after: Option<String>,
    /// Sessions started at or before this ISO-8601 time
    pub before: Option<String>,
    pub sort: SessionSort,
    /// Page size, [`DEFAULT_SESSION_LIMIT`] when unset
    pub limit: Option<usize>,
    pub offset: usize,
}

/// One page of a session list.
#[derive(Debug, Clone, Serialize)]
pub struct SessionPage {
    pub sessions: Vec<SessionRow>,
    /// Matching sessions across all pages
    pub total: i64,
}

/// Filter for aggregate stats
#[derive(Debug, Clone, Default)]
pub struct StatsFilter {
    pub after: Option<String>,
    pub before: Option<String>,
    /// Substring of the primary model id
    pub model: Option<String>,
}

/// Sessions, cost and tokens for one group key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupStat {
    pub key: String,
    pub sessions: i64,
    pub cost: f64,
    pub tokens: i64,
}

/// Aggregate usage across sessions.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Stats {
    pub total_sessions: i64,
    pub total_cost: f64,
    pub total_tokens: i64,
    pub tokens: TokenTotals,
    pub avg_cost_per_session: f64,
    /// Highest cost first
    pub by_model: Vec<GroupStat>,
    /// Highest cost first
    pub by_project: Vec<GroupStat>,
    /// Keyed by `YYYY-MM-DD` of the start time, oldest first
    pub by_day: Vec<GroupStat>,
    pub top_tools: Vec<ToolCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub last_synced_at: Option<String>,
    pub session_count: i64,
}

/// Database handle with connection pooling (single connection for now)
pub struct Database {
    conn: Mutex<Connection>,
    context_window_tokens: i64,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &PathBuf) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // WAL lets readers proceed while a sync is writing
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
            context_window_tokens: DEFAULT_CONTEXT_WINDOW_TOKENS,
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Mutex::new(conn),
            context_window_tokens: DEFAULT_CONTEXT_WINDOW_TOKENS,
        })
    }

    /// Use a different context window for peak-context percentages.
    pub fn with_context_window(mut self, tokens: i64) -> Self {
        if tokens > 0 {
            self.context_window_tokens = tokens;
        }
        self
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn();
        super::schema::run_migrations(&conn)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-query leaves the connection itself usable
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ============================================
    // Session writes
    // ============================================

    /// Replace a session and all of its children atomically.
    ///
    /// Readers see either the previous state or the new one, never a mix.
    pub fn replace_session(&self, session: &SessionAggregate) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        for table in ["tool_calls", "messages", "subagents", "compactions", "sessions"] {
            let column = if table == "sessions" { "id" } else { "session_id" };
            tx.execute(
                &format!("DELETE FROM {} WHERE {} = ?", table, column),
                [&session.id],
            )?;
        }

        Self::insert_session_row(&tx, session)?;
        Self::insert_tool_calls(&tx, &session.id, &session.tool_calls)?;
        Self::insert_messages(&tx, &session.id, &session.messages)?;
        Self::insert_subagents(&tx, &session.subagents)?;
        Self::insert_compactions(&tx, &session.id, &session.compactions)?;

        tx.commit()?;
        Ok(())
    }

    fn insert_session_row(tx: &Transaction<'_>, s: &SessionAggregate) -> Result<()> {
        tx.execute(
            r#"
            INSERT INTO sessions (id, project, project_hash, first_prompt, model,
                                  input_tokens, output_tokens, cache_read_tokens, cache_create_tokens,
                                  estimated_cost_usd, message_count, tool_call_count, subagent_count,
                                  turn_count, peak_context_tokens, started_at, ended_at, duration_ms,
                                  synced_at, source_path, source_mtime)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21)
            "#,
            params![
                s.id,
                s.project,
                s.project_hash,
                s.first_prompt,
                s.model,
                s.tokens.input_tokens,
                s.tokens.output_tokens,
                s.tokens.cache_read_tokens,
                s.tokens.cache_create_tokens,
                s.estimated_cost_usd,
                s.message_count,
                s.tool_call_count,
                s.subagent_count,
                s.turn_count,
                s.peak_context_tokens,
                s.started_at,
                s.ended_at,
                s.duration_ms,
                Utc::now().to_rfc3339(),
                s.source_path,
                s.source_mtime,
            ],
        )?;
        Ok(())
    }

    fn insert_tool_calls(tx: &Transaction<'_>, session_id: &str, calls: &[ToolCall]) -> Result<()> {
        let mut stmt = tx.prepare(
            r#"
            INSERT INTO tool_calls (session_id, subagent_id, tool_use_id, tool_name,
                                    tool_input, tool_response, status, timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )?;
        for call in calls {
            stmt.execute(params![
                session_id,
                call.subagent_id,
                call.tool_use_id,
                call.tool_name,
                call.tool_input,
                call.tool_response,
                call.status.as_str(),
                call.timestamp,
            ])?;
        }
        Ok(())
    }

    fn insert_messages(tx: &Transaction<'_>, session_id: &str, messages: &[Message]) -> Result<()> {
        let mut stmt = tx.prepare(
            r#"
            INSERT INTO messages (session_id, role, content, timestamp, model, cost_usd)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )?;
        for message in messages {
            stmt.execute(params![
                session_id,
                message.role.as_str(),
                message.content,
                message.timestamp,
                message.model,
                message.cost_usd,
            ])?;
        }
        Ok(())
    }

    fn insert_subagents(tx: &Transaction<'_>, subagents: &[SubagentAggregate]) -> Result<()> {
        let mut stmt = tx.prepare(
            r#"
            INSERT INTO subagents (id, session_id, agent_type, model, prompt,
                                   input_tokens, output_tokens, cache_read_tokens, cache_create_tokens,
                                   estimated_cost_usd, tool_call_count, duration_ms, result_summary)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )?;
        for a in subagents {
            stmt.execute(params![
                a.id,
                a.session_id,
                a.agent_type,
                a.model,
                a.prompt,
                a.tokens.input_tokens,
                a.tokens.output_tokens,
                a.tokens.cache_read_tokens,
                a.tokens.cache_create_tokens,
                a.estimated_cost_usd,
                a.tool_call_count,
                a.duration_ms,
                a.result_summary,
            ])?;
        }
        Ok(())
    }

    fn insert_compactions(
        tx: &Transaction<'_>,
        session_id: &str,
        compactions: &[Compaction],
    ) -> Result<()> {
        let mut stmt = tx.prepare(
            "INSERT INTO compactions (session_id, trigger, pre_tokens, timestamp) VALUES (?1, ?2, ?3, ?4)",
        )?;
        for c in compactions {
            stmt.execute(params![session_id, c.trigger, c.pre_tokens, c.timestamp])?;
        }
        Ok(())
    }

    // ============================================
    // Sync bookkeeping
    // ============================================

    /// Source file mtime recorded when the session was last stored.
    pub fn get_session_mtime(&self, id: &str) -> Result<Option<String>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT source_mtime FROM sessions WHERE id = ?",
            [id],
            |row| row.get(0),
        )
        .optional()
        .map_err(Error::from)
    }

    pub fn count_sessions(&self) -> Result<usize> {
        let conn = self.conn();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn get_sync_status(&self) -> Result<SyncStatus> {
        let conn = self.conn();
        let (last_synced_at, session_count) = conn.query_row(
            "SELECT MAX(synced_at), COUNT(*) FROM sessions",
            [],
            |row| Ok((row.get::<_, Option<String>>(0)?, row.get::<_, i64>(1)?)),
        )?;
        Ok(SyncStatus {
            last_synced_at,
            session_count,
        })
    }

    // ============================================
    // Session reads
    // ============================================

    /// Shared projection for [`SessionRow`]; filters refer to `s.`.
    const SESSION_ROW_SELECT: &'static str = r#"
        SELECT s.*,
               (SELECT COUNT(*) FROM compactions c WHERE c.session_id = s.id) AS compaction_count,
               MAX(s.peak_context_tokens,
                   COALESCE((SELECT MAX(c.pre_tokens) FROM compactions c WHERE c.session_id = s.id), 0))
                   AS effective_peak
        FROM sessions s
    "#;

    /// List sessions with filtering, sorting and paging
    pub fn list_sessions(&self, filter: &SessionFilter) -> Result<SessionPage> {
        let conn = self.conn();

        let mut where_sql = String::from(" WHERE 1=1");
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![];

        if let Some(project) = &filter.project {
            where_sql.push_str(" AND s.project LIKE ?");
            params.push(Box::new(format!("%{}%", project)));
        }

        if let Some(model) = &filter.model {
            where_sql.push_str(" AND s.model LIKE ?");
            params.push(Box::new(format!("%{}%", model)));
        }

        if let Some(after) = &filter.after {
            where_sql.push_str(" AND s.started_at >= ?");
            params.push(Box::new(after.clone()));
        }

        if let Some(before) = &filter.before {
            where_sql.push_str(" AND s.started_at <= ?");
            params.push(Box::new(before.clone()));
        }

        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM sessions s{}", where_sql),
            params_refs.as_slice(),
            |row| row.get(0),
        )?;

        let sql = format!(
            "{}{} ORDER BY {} LIMIT {} OFFSET {}",
            Self::SESSION_ROW_SELECT,
            where_sql,
            filter.sort.order_by(),
            filter.limit.unwrap_or(DEFAULT_SESSION_LIMIT),
            filter.offset
        );

        let window = self.context_window_tokens;
        let mut stmt = conn.prepare(&sql)?;
        let sessions = stmt
            .query_map(params_refs.as_slice(), |row| Self::row_to_session(row, window))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(SessionPage { sessions, total })
    }

    /// Get a session by ID
    pub fn get_session(&self, id: &str) -> Result<Option<SessionRow>> {
        let conn = self.conn();
        let window = self.context_window_tokens;
        conn.query_row(
            &format!("{} WHERE s.id = ?", Self::SESSION_ROW_SELECT),
            [id],
            |row| Self::row_to_session(row, window),
        )
        .optional()
        .map_err(Error::from)
    }

    fn row_to_session(row: &Row, context_window_tokens: i64) -> rusqlite::Result<SessionRow> {
        let effective_peak: i64 = row.get("effective_peak")?;

        Ok(SessionRow {
            id: row.get("id")?,
            project: row.get("project")?,
            project_hash: row.get("project_hash")?,
            first_prompt: row.get("first_prompt")?,
            model: row.get("model")?,
            tokens: TokenTotals {
                input_tokens: row.get("input_tokens")?,
                output_tokens: row.get("output_tokens")?,
                cache_read_tokens: row.get("cache_read_tokens")?,
                cache_create_tokens: row.get("cache_create_tokens")?,
            },
            estimated_cost_usd: row.get("estimated_cost_usd")?,
            message_count: row.get("message_count")?,
            tool_call_count: row.get("tool_call_count")?,
            subagent_count: row.get("subagent_count")?,
            turn_count: row.get("turn_count")?,
            peak_context_tokens: row.get("peak_context_tokens")?,
            peak_context_pct: percent_of(effective_peak, context_window_tokens),
            compaction_count: row.get("compaction_count")?,
            started_at: row.get("started_at")?,
            ended_at: row.get("ended_at")?,
            duration_ms: row.get("duration_ms")?,
            source_path: row.get("source_path")?,
            synced_at: row.get("synced_at")?,
        })
    }

    /// Tool calls and messages of a session, merged by timestamp.
    ///
    /// Sub-agent tool calls are included and carry their `subagent_id`.
    pub fn get_timeline(&self, session_id: &str) -> Result<Vec<TimelineEntry>> {
        let conn = self.conn();

        let tool_calls = conn
            .prepare("SELECT * FROM tool_calls WHERE session_id = ? ORDER BY timestamp, id")?
            .query_map([session_id], Self::row_to_tool_call)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let messages = conn
            .prepare("SELECT * FROM messages WHERE session_id = ? ORDER BY timestamp, id")?
            .query_map([session_id], Self::row_to_message)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(merge_timeline(tool_calls, messages))
    }

    fn row_to_tool_call(row: &Row) -> rusqlite::Result<ToolCall> {
        let status: String = row.get("status")?;
        Ok(ToolCall {
            tool_use_id: row.get("tool_use_id")?,
            tool_name: row.get("tool_name")?,
            tool_input: row.get("tool_input")?,
            tool_response: row.get("tool_response")?,
            status: status.parse().unwrap_or(ToolStatus::Pending),
            timestamp: row.get("timestamp")?,
            subagent_id: row.get("subagent_id")?,
        })
    }

    fn row_to_message(row: &Row) -> rusqlite::Result<Message> {
        let role: String = row.get("role")?;
        Ok(Message {
            role: role.parse().unwrap_or(Role::User),
            content: row.get("content")?,
            timestamp: row.get("timestamp")?,
            model: row.get("model")?,
            cost_usd: row.get("cost_usd")?,
        })
    }

    /// Sub-agents of a session, ordered by agent id.
    pub fn get_subagents(&self, session_id: &str) -> Result<Vec<SubagentAggregate>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT * FROM subagents WHERE session_id = ? ORDER BY id")?;
        let subagents = stmt
            .query_map([session_id], Self::row_to_subagent)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(subagents)
    }

    fn row_to_subagent(row: &Row) -> rusqlite::Result<SubagentAggregate> {
        Ok(SubagentAggregate {
            id: row.get("id")?,
            session_id: row.get("session_id")?,
            agent_type: row.get("agent_type")?,
            model: row.get("model")?,
            prompt: row.get("prompt")?,
            tokens: TokenTotals {
                input_tokens: row.get("input_tokens")?,
                output_tokens: row.get("output_tokens")?,
                cache_read_tokens: row.get("cache_read_tokens")?,
                cache_create_tokens: row.get("cache_create_tokens")?,
            },
            estimated_cost_usd: row.get("estimated_cost_usd")?,
            tool_call_count: row.get("tool_call_count")?,
            duration_ms: row.get("duration_ms")?,
            result_summary: row.get("result_summary")?,
        })
    }

    /// Compaction events of a session, oldest first.
    pub fn get_compactions(&self, session_id: &str) -> Result<Vec<Compaction>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT trigger, pre_tokens, timestamp FROM compactions WHERE session_id = ? ORDER BY timestamp, id",
        )?;
        let compactions = stmt
            .query_map([session_id], |row| {
                Ok(Compaction {
                    trigger: row.get(0)?,
                    pre_tokens: row.get(1)?,
                    timestamp: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(compactions)
    }

    /// Behavioral insights for a session, `None` if it does not exist.
    pub fn get_session_insights(&self, session_id: &str) -> Result<Option<SessionInsights>> {
        let Some(session) = self.get_session(session_id)? else {
            return Ok(None);
        };
        let timeline = self.get_timeline(session_id)?;
        let compactions = self.get_compactions(session_id)?;

        Ok(Some(compute_insights(
            &timeline,
            &compactions,
            session.duration_ms.unwrap_or(0),
        )))
    }

    // ============================================
    // Aggregate stats
    // ============================================

    /// Totals and breakdowns over the sessions matching `filter`.
    pub fn get_stats(&self, filter: &StatsFilter) -> Result<Stats> {
        let conn = self.conn();

        let mut where_sql = String::from(" WHERE 1=1");
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![];

        if let Some(after) = &filter.after {
            where_sql.push_str(" AND s.started_at >= ?");
            params.push(Box::new(after.clone()));
        }

        if let Some(before) = &filter.before {
            where_sql.push_str(" AND s.started_at <= ?");
            params.push(Box::new(before.clone()));
        }

        if let Some(model) = &filter.model {
            where_sql.push_str(" AND s.model LIKE ?");
            params.push(Box::new(format!("%{}%", model)));
        }

        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let (total_sessions, total_cost, tokens) = conn.query_row(
            &format!(
                r#"
                SELECT COUNT(*),
                       COALESCE(SUM(s.estimated_cost_usd), 0.0),
                       COALESCE(SUM(s.input_tokens), 0),
                       COALESCE(SUM(s.output_tokens), 0),
                       COALESCE(SUM(s.cache_read_tokens), 0),
                       COALESCE(SUM(s.cache_create_tokens), 0)
                FROM sessions s{}
                "#,
                where_sql
            ),
            params_refs.as_slice(),
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, f64>(1)?,
                    TokenTotals {
                        input_tokens: row.get(2)?,
                        output_tokens: row.get(3)?,
                        cache_read_tokens: row.get(4)?,
                        cache_create_tokens: row.get(5)?,
                    },
                ))
            },
        )?;

        let group = |key_expr: &str, extra_where: &str, order: &str| -> Result<Vec<GroupStat>> {
            let sql = format!(
                r#"
                SELECT {key} AS key,
                       COUNT(*),
                       COALESCE(SUM(s.estimated_cost_usd), 0.0),
                       COALESCE(SUM(s.input_tokens + s.output_tokens + s.cache_read_tokens + s.cache_create_tokens), 0)
                FROM sessions s{where_sql}{extra_where}
                GROUP BY key
                ORDER BY {order}
                "#,
                key = key_expr,
                where_sql = where_sql,
                extra_where = extra_where,
                order = order,
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_refs.as_slice(), |row| {
                    Ok(GroupStat {
                        key: row.get(0)?,
                        sessions: row.get(1)?,
                        cost: row.get(2)?,
                        tokens: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        };

        let by_model = group("COALESCE(s.model, 'unknown')", "", "3 DESC, key")?;
        let by_project = group("s.project", "", "3 DESC, key")?;
        let by_day = group(
            "substr(s.started_at, 1, 10)",
            " AND s.started_at IS NOT NULL",
            "key ASC",
        )?;

        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT t.tool_name, COUNT(*) AS cnt
            FROM tool_calls t
            JOIN sessions s ON t.session_id = s.id{}
            GROUP BY t.tool_name
            ORDER BY cnt DESC, t.tool_name
            LIMIT {}
            "#,
            where_sql, TOP_TOOLS_LIMIT
        ))?;
        let top_tools = stmt
            .query_map(params_refs.as_slice(), |row| {
                Ok(ToolCount {
                    tool: row.get(0)?,
                    count: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let avg_cost_per_session = if total_sessions > 0 {
            total_cost / total_sessions as f64
        } else {
            0.0
        };

        Ok(Stats {
            total_sessions,
            total_cost,
            total_tokens: tokens.total(),
            tokens,
            avg_cost_per_session,
            by_model,
            by_project,
            by_day,
            top_tools,
        })
    }
}

/// `part / whole` as a percentage rounded to one decimal place.
fn percent_of(part: i64, whole: i64) -> f64 {
    if whole <= 0 {
        return 0.0;
    }
    (part as f64 * 1000.0 / whole as f64).round() / 10.0
}
