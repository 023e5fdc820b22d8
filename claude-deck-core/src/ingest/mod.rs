//! Ingestion layer for Claude Code session logs
//!
//! Walks the agent's project directories, parses every session whose file
//! changed since the last sync, and replaces that session in the database.
//!
//! ## Layout
//!
//! ```text
//! <claude_dir>/projects/
//! └── -Users-me-work-app/                  project directory (path with '/' → '-')
//!     ├── 6f1c….jsonl                      session log
//!     └── 6f1c…/subagents/agent-a1.jsonl   sub-agent logs for that session
//! ```
//!
//! ## Flow
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐     ┌─────────────────┐
//! │  Session files  │ ──► │ IngestCoordinator│ ──► │    Database     │
//! │ (~/.claude/...) │     │  mtime check     │     │ replace_session │
//! └─────────────────┘     └──────────────────┘     └─────────────────┘
//!                               │
//!                               ▼
//!                    ┌──────────────────────┐
//!                    │  parse_session       │
//!                    │  + parse_subagent    │
//!                    │    (tool calls merged│
//!                    │     into the session)│
//!                    └──────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use claude_deck_core::{Config, Database};
//! use claude_deck_core::ingest::IngestCoordinator;
//!
//! let config = Config::load()?;
//! let db = Database::open(&Config::database_path())?;
//! db.migrate()?;
//! let coordinator = IngestCoordinator::new(db, config.claude_dir());
//!
//! let result = coordinator.sync_all()?;
//! println!("{} parsed, {} skipped", result.parsed, result.skipped);
//! ```

pub mod record;
pub mod session;
pub mod subagent;
pub mod text;

pub use record::{decode, DecodeError, Event, EventKind};
pub use session::{parse_session, SessionSource};
pub use subagent::{classify_agent_type, parse_subagent, SubagentParse};

use crate::db::Database;
use crate::error::{Error, Result};
use crate::pricing::PricingTable;
use chrono::{DateTime, SecondsFormat, Utc};
use std::path::{Path, PathBuf};

/// Cap for serialized tool input and response payloads.
pub const MAX_TOOL_PAYLOAD_CHARS: usize = 2000;

/// Result of a full sync.
#[derive(Debug, Default)]
pub struct SyncResult {
    /// Sessions parsed and stored
    pub parsed: usize,
    /// Sessions whose file was unchanged
    pub skipped: usize,
    /// Session files that failed (file path → error message)
    pub errors: Vec<(PathBuf, String)>,
    /// Sub-agent files that failed; their sessions were still stored
    pub subagent_errors: Vec<(PathBuf, String)>,
    /// Sessions in the database after the sync
    pub total_sessions: usize,
}

/// A discovered session log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFile {
    pub path: PathBuf,
    pub session_id: String,
    /// Display name, see [`decode_project_name`]
    pub project: String,
    /// Raw project directory name
    pub project_hash: String,
}

impl SessionFile {
    /// `<project>/<session-id>/subagents`
    pub fn subagent_dir(&self) -> PathBuf {
        self.path
            .with_file_name(&self.session_id)
            .join("subagents")
    }
}

/// What happened to one session file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Parsed,
    Skipped,
}

/// Coordinates discovery, parsing, and storage.
pub struct IngestCoordinator {
    db: Database,
    claude_dir: PathBuf,
    pricing: PricingTable,
}

impl IngestCoordinator {
    /// Create a coordinator over `<claude_dir>/projects` with built-in prices.
    pub fn new(db: Database, claude_dir: impl Into<PathBuf>) -> Self {
        Self {
            db,
            claude_dir: claude_dir.into(),
            pricing: PricingTable::builtin(),
        }
    }

    /// Use a different price table.
    pub fn with_pricing(mut self, pricing: PricingTable) -> Self {
        self.pricing = pricing;
        self
    }

    /// The database sessions are written to.
    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn projects_dir(&self) -> PathBuf {
        self.claude_dir.join("projects")
    }

    /// Find every `<project>/<session-id>.jsonl`, sorted by path.
    ///
    /// A missing projects directory yields no files.
    pub fn discover_sessions(&self) -> Result<Vec<SessionFile>> {
        let projects_dir = self.projects_dir();
        if !projects_dir.is_dir() {
            tracing::info!(path = %projects_dir.display(), "Projects directory not found");
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for path in glob_paths(&projects_dir, "*/*.jsonl")? {
            if !path.is_file() {
                continue;
            }
            let (Some(session_id), Some(project_hash)) = (
                file_stem(&path),
                path.parent().and_then(|p| p.file_name()).and_then(|n| n.to_str()),
            ) else {
                continue;
            };
            files.push(SessionFile {
                session_id,
                project: decode_project_name(project_hash),
                project_hash: project_hash.to_string(),
                path,
            });
        }

        tracing::info!(count = files.len(), "Discovered session files");
        Ok(files)
    }

    /// Sync all discovered session files.
    pub fn sync_all(&self) -> Result<SyncResult> {
        self.sync_all_with_progress(|_, _, _| {})
    }

    /// Sync all discovered session files with progress callback.
    ///
    /// The callback receives `(current_file_index, total_files, file_path)` before
    /// each file is processed.
    ///
    /// A failing session file is recorded in [`SyncResult::errors`] and the walk
    /// carries on; its previously stored state is left untouched.
    pub fn sync_all_with_progress<F>(&self, mut on_progress: F) -> Result<SyncResult>
    where
        F: FnMut(usize, usize, &Path),
    {
        let files = self.discover_sessions()?;
        let total = files.len();
        let mut result = SyncResult::default();

        for (i, file) in files.iter().enumerate() {
            on_progress(i, total, &file.path);

            match self.sync_session(file, &mut result.subagent_errors) {
                Ok(SessionOutcome::Parsed) => result.parsed += 1,
                Ok(SessionOutcome::Skipped) => {
                    tracing::debug!(path = %file.path.display(), "Session unchanged, skipped");
                    result.skipped += 1;
                }
                Err(e) => {
                    tracing::warn!(path = %file.path.display(), error = %e, "Failed to sync session");
                    result.errors.push((file.path.clone(), e.to_string()));
                }
            }
        }

        result.total_sessions = self.db.count_sessions()?;

        tracing::info!(
            parsed = result.parsed,
            skipped = result.skipped,
            errors = result.errors.len(),
            subagent_errors = result.subagent_errors.len(),
            total_sessions = result.total_sessions,
            "Sync complete"
        );

        Ok(result)
    }

    /// Parse and store one session if its file changed since the last sync.
    pub fn sync_session(
        &self,
        file: &SessionFile,
        subagent_errors: &mut Vec<(PathBuf, String)>,
    ) -> Result<SessionOutcome> {
        let mtime = file_mtime(&file.path)?;
        if self.db.get_session_mtime(&file.session_id)?.as_deref() == Some(mtime.as_str()) {
            return Ok(SessionOutcome::Skipped);
        }

        let source = SessionSource {
            id: &file.session_id,
            project: &file.project,
            project_hash: &file.project_hash,
            path: &file.path,
            mtime: &mtime,
        };
        let mut session = parse_session(&source, &self.pricing)?;

        let subagent_dir = file.subagent_dir();
        if subagent_dir.is_dir() {
            // Every `.jsonl` entry is a sub-agent log; one that cannot be read is an error
            match glob_paths(&subagent_dir, "*.jsonl") {
                Ok(paths) => {
                    for path in paths {
                        let Some(agent_id) = file_stem(&path) else {
                            continue;
                        };
                        match parse_subagent(&path, &agent_id, &file.session_id, &self.pricing) {
                            Ok(parsed) => {
                                session.tool_calls.extend(parsed.tool_calls);
                                session.subagents.push(parsed.subagent);
                            }
                            Err(e) => {
                                tracing::warn!(path = %path.display(), error = %e, "Failed to parse sub-agent log");
                                subagent_errors.push((path, e.to_string()));
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(path = %subagent_dir.display(), error = %e, "Failed to list sub-agent logs");
                    subagent_errors.push((subagent_dir, e.to_string()));
                }
            }
        }
        session.subagent_count = session.subagents.len() as i64;

        self.db.replace_session(&session)?;

        tracing::debug!(
            session_id = %session.id,
            tool_calls = session.tool_calls.len(),
            subagents = session.subagent_count,
            "Session stored"
        );
        Ok(SessionOutcome::Parsed)
    }
}

/// Human-readable project name from an encoded project directory.
///
/// The directory name is the project path with separators replaced by `-`;
/// the last two segments are kept. Hyphens inside the original names are
/// indistinguishable from separators, so `my-app` displays as `my/app`.
pub fn decode_project_name(dir_name: &str) -> String {
    let segments: Vec<&str> = dir_name.split('-').filter(|s| !s.is_empty()).collect();
    match segments.len() {
        0 => dir_name.to_string(),
        n => segments[n.saturating_sub(2)..].join("/"),
    }
}

/// Entries under `dir` matching `pattern`, sorted by path.
fn glob_paths(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let full = format!(
        "{}/{}",
        glob::Pattern::escape(&dir.to_string_lossy()),
        pattern
    );
    let paths = glob::glob(&full).map_err(|e| Error::Parse {
        file: dir.display().to_string(),
        message: format!("invalid glob pattern: {}", e),
    })?;

    let mut found: Vec<PathBuf> = paths.filter_map(|entry| entry.ok()).collect();
    found.sort();
    Ok(found)
}

fn file_stem(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.to_string())
}

/// File modification time as an RFC 3339 string with millisecond precision.
fn file_mtime(path: &Path) -> Result<String> {
    let modified: DateTime<Utc> = std::fs::metadata(path)?.modified()?.into();
    Ok(modified.to_rfc3339_opts(SecondsFormat::Millis, true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_project_name() {
        assert_eq!(
            decode_project_name("-Users-me-work-gypsum-org-code-polos"),
            "code/polos"
        );
        assert_eq!(decode_project_name("-tmp"), "tmp");
        assert_eq!(decode_project_name("---"), "---");
        assert_eq!(decode_project_name("plain"), "plain");
    }

    #[test]
    fn test_subagent_dir() {
        let file = SessionFile {
            path: PathBuf::from("/c/projects/-p/abc.jsonl"),
            session_id: "abc".into(),
            project: "p".into(),
            project_hash: "-p".into(),
        };
        assert_eq!(
            file.subagent_dir(),
            PathBuf::from("/c/projects/-p/abc/subagents")
        );
    }

    #[test]
    fn test_missing_projects_dir_is_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        let coordinator = IngestCoordinator::new(db, dir.path());

        assert!(coordinator.discover_sessions().unwrap().is_empty());
        let result = coordinator.sync_all().unwrap();
        assert_eq!(result.parsed + result.skipped + result.total_sessions, 0);
    }
}
