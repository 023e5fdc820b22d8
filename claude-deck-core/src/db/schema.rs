//! Database schema and migrations
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.

use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: sessions and everything parsed out of them
    r#"
    CREATE TABLE IF NOT EXISTS sessions (
        id                   TEXT PRIMARY KEY,
        project              TEXT NOT NULL,
        project_hash         TEXT NOT NULL,
        first_prompt         TEXT,
        model                TEXT,
        input_tokens         INTEGER NOT NULL DEFAULT 0,
        output_tokens        INTEGER NOT NULL DEFAULT 0,
        cache_read_tokens    INTEGER NOT NULL DEFAULT 0,
        cache_create_tokens  INTEGER NOT NULL DEFAULT 0,
        estimated_cost_usd   REAL NOT NULL DEFAULT 0,
        message_count        INTEGER NOT NULL DEFAULT 0,
        tool_call_count      INTEGER NOT NULL DEFAULT 0,
        subagent_count       INTEGER NOT NULL DEFAULT 0,
        turn_count           INTEGER NOT NULL DEFAULT 0,
        peak_context_tokens  INTEGER NOT NULL DEFAULT 0,
        started_at           TEXT,
        ended_at             TEXT,
        duration_ms          INTEGER,
        synced_at            TEXT NOT NULL,

        -- Lineage, used to skip unchanged files
        source_path          TEXT NOT NULL,
        source_mtime         TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_sessions_project ON sessions(project);
    CREATE INDEX IF NOT EXISTS idx_sessions_started ON sessions(started_at);

    CREATE TABLE IF NOT EXISTS tool_calls (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id       TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
        subagent_id      TEXT,
        tool_use_id      TEXT,
        tool_name        TEXT NOT NULL,
        tool_input       TEXT,
        tool_response    TEXT,
        status           TEXT NOT NULL CHECK (status IN ('pending', 'success')),
        timestamp        TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_tool_calls_session ON tool_calls(session_id);
    CREATE INDEX IF NOT EXISTS idx_tool_calls_tool ON tool_calls(tool_name);

    CREATE TABLE IF NOT EXISTS messages (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id       TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
        role             TEXT NOT NULL,
        content          TEXT NOT NULL,
        timestamp        TEXT NOT NULL,
        model            TEXT,
        cost_usd         REAL
    );

    CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id);

    CREATE TABLE IF NOT EXISTS subagents (
        id                   TEXT NOT NULL,
        session_id           TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
        agent_type           TEXT,
        model                TEXT,
        prompt               TEXT,
        input_tokens         INTEGER NOT NULL DEFAULT 0,
        output_tokens        INTEGER NOT NULL DEFAULT 0,
        cache_read_tokens    INTEGER NOT NULL DEFAULT 0,
        cache_create_tokens  INTEGER NOT NULL DEFAULT 0,
        estimated_cost_usd   REAL NOT NULL DEFAULT 0,
        tool_call_count      INTEGER NOT NULL DEFAULT 0,
        duration_ms          INTEGER,
        result_summary       TEXT,
        PRIMARY KEY (id, session_id)
    );

    CREATE INDEX IF NOT EXISTS idx_subagents_session ON subagents(session_id);

    CREATE TABLE IF NOT EXISTS compactions (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id       TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
        trigger          TEXT NOT NULL DEFAULT 'auto',
        pre_tokens       INTEGER NOT NULL DEFAULT 0,
        timestamp        TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_compactions_session ON compactions(session_id);
    "#,
];

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> crate::error::Result<()> {
    let current_version: i32 = conn
        .query_row("PRAGMA user_version", [], |r| r.get(0))
        .unwrap_or(0);

    tracing::info!(
        current_version,
        target_version = SCHEMA_VERSION,
        "Checking database migrations"
    );

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::info!(version, "Running migration");
            conn.execute_batch(migration)?;
            conn.execute_batch(&format!("PRAGMA user_version = {}", version))?;
        }
    }

    if current_version < SCHEMA_VERSION {
        tracing::info!(
            from = current_version,
            to = SCHEMA_VERSION,
            "Migrations complete"
        );
    }

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> crate::error::Result<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    Ok(version)
}
