//! claude-deck - cost and activity reports for Claude Code session logs
//!
//! Syncs `~/.claude/projects/**.jsonl` into a local SQLite database and
//! reports on it.
//!
//! File locations follow the XDG base directories:
//! - Database: $XDG_DATA_HOME/claude-deck/data.db (~/.local/share/claude-deck/data.db)
//! - Logs: $XDG_STATE_HOME/claude-deck/claude-deck.log (~/.local/state/claude-deck/claude-deck.log)
//! - Config: $XDG_CONFIG_HOME/claude-deck/config.toml (~/.config/claude-deck/config.toml)

mod process_lock;

use anyhow::{Context, Result};
use chrono::{Duration, SecondsFormat, Utc};
use clap::{ArgAction, Parser, Subcommand};
use claude_deck_core::db::{SessionSort, StatsFilter};
use claude_deck_core::format::{format_cost, format_duration_ms, format_relative_time, format_tokens};
use claude_deck_core::ingest::text::clip;
use claude_deck_core::pricing::short_model_name;
use claude_deck_core::{Config, Database, Error, IngestCoordinator, PricingTable, SessionFilter, SyncResult};
use indicatif::{ProgressBar, ProgressStyle};
use process_lock::acquire_sync_guard;
use std::path::PathBuf;

/// Rows shown per breakdown in `stats`.
const BREAKDOWN_ROWS: usize = 10;

#[derive(Parser)]
#[command(name = "claude-deck")]
#[command(about = "Cost and activity reports for Claude Code session logs")]
#[command(version)]
struct Cli {
    /// Agent data directory (default: [sources] claude_dir, else ~/.claude)
    #[arg(long, global = true)]
    claude_dir: Option<PathBuf>,

    /// Database file (default: $XDG_DATA_HOME/claude-deck/data.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Verbose output (-v debug logging and per-file errors, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse new and changed session logs into the database
    Sync,

    /// Sync, then print cost and token totals
    Stats {
        /// Only sessions started in the last N days
        #[arg(long)]
        days: Option<i64>,

        /// Only sessions whose model id contains this text
        #[arg(long)]
        model: Option<String>,

        /// Print JSON instead of a report
        #[arg(long)]
        json: bool,
    },

    /// List stored sessions
    Sessions {
        /// Project name contains this text
        #[arg(long)]
        project: Option<String>,

        /// Model id contains this text
        #[arg(long)]
        model: Option<String>,

        /// date, cost, tokens or duration (always descending)
        #[arg(long, default_value = "date")]
        sort: SessionSort,

        #[arg(long, default_value = "50")]
        limit: usize,

        #[arg(long, default_value = "0")]
        offset: usize,
    },

    /// Print a session, its sub-agents and its timeline as JSON
    Show { id: String },

    /// Print behavioral insights for a session as JSON
    Insights { id: String },
}

/// Resolved settings shared by every command.
struct Env {
    config: Config,
    claude_dir: PathBuf,
    db_path: PathBuf,
}

impl Env {
    fn open_database(&self) -> Result<Database> {
        tracing::info!(path = %self.db_path.display(), "Opening database");
        let db = Database::open(&self.db_path)
            .with_context(|| format!("failed to open database {}", self.db_path.display()))?
            .with_context_window(self.config.display.context_window_tokens);
        db.migrate().context("failed to run database migrations")?;
        Ok(db)
    }

    fn coordinator(&self) -> Result<IngestCoordinator> {
        Ok(
            IngestCoordinator::new(self.open_database()?, &self.claude_dir)
                .with_pricing(PricingTable::from_config(&self.config.pricing)),
        )
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load().context("failed to load configuration")?;
    match cli.verbose {
        0 => {}
        1 => config.logging.level = "debug".to_string(),
        _ => config.logging.level = "trace".to_string(),
    }

    let _log_guard =
        claude_deck_core::logging::init(&config.logging).context("failed to initialize logging")?;
    tracing::info!("claude-deck starting");
    if cli.verbose > 0 {
        eprintln!("Logs: {}", claude_deck_core::logging::log_file_path().display());
    }

    let env = Env {
        claude_dir: cli.claude_dir.clone().unwrap_or_else(|| config.claude_dir()),
        db_path: cli.db.clone().unwrap_or_else(Config::database_path),
        config,
    };

    match cli.command {
        Command::Sync => {
            let coordinator = env.coordinator()?;
            let result = run_sync(&env, &coordinator, cli.verbose)?;
            println!(
                "Done: {} parsed, {} skipped, {} errors. Total: {} sessions.",
                result.parsed,
                result.skipped,
                result.errors.len(),
                result.total_sessions
            );
        }
        Command::Stats { days, model, json } => {
            let coordinator = env.coordinator()?;
            run_sync(&env, &coordinator, cli.verbose)?;

            let filter = StatsFilter {
                after: days.map(|d| {
                    (Utc::now() - Duration::days(d)).to_rfc3339_opts(SecondsFormat::Millis, true)
                }),
                before: None,
                model,
            };
            print_stats(coordinator.database(), &filter, json)?;
        }
        Command::Sessions {
            project,
            model,
            sort,
            limit,
            offset,
        } => {
            let db = env.open_database()?;
            let filter = SessionFilter {
                project,
                model,
                sort,
                limit: Some(limit),
                offset,
                ..Default::default()
            };
            print_sessions(&db, &filter)?;
        }
        Command::Show { id } => {
            let db = env.open_database()?;
            let session = db
                .get_session(&id)?
                .ok_or_else(|| Error::SessionNotFound(id.clone()))?;
            let detail = serde_json::json!({
                "session": session,
                "subagents": db.get_subagents(&id)?,
                "timeline": db.get_timeline(&id)?,
            });
            println!("{}", serde_json::to_string_pretty(&detail)?);
        }
        Command::Insights { id } => {
            let db = env.open_database()?;
            let insights = db
                .get_session_insights(&id)?
                .ok_or_else(|| Error::SessionNotFound(id.clone()))?;
            println!("{}", serde_json::to_string_pretty(&insights)?);
        }
    }

    Ok(())
}

/// Sync with a progress bar while holding the database's sync lock.
fn run_sync(env: &Env, coordinator: &IngestCoordinator, verbose: u8) -> Result<SyncResult> {
    let _sync_guard =
        acquire_sync_guard(&env.db_path).context("failed to acquire process lock")?;

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .context("invalid progress template")?
            .progress_chars("#>-"),
    );

    let result = coordinator
        .sync_all_with_progress(|current, total, path| {
            if current == 0 {
                pb.set_length(total as u64);
            }
            pb.set_position(current as u64);
            pb.set_message(
                path.file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("...")
                    .to_string(),
            );
        })
        .context("sync failed")?;

    pb.finish_and_clear();

    for (path, error) in &result.errors {
        eprintln!("error: {}: {}", path.display(), error);
    }
    if verbose > 0 {
        for (path, error) in &result.subagent_errors {
            eprintln!("warning: sub-agent {}: {}", path.display(), error);
        }
    }

    Ok(result)
}

fn print_stats(db: &Database, filter: &StatsFilter, json: bool) -> Result<()> {
    let stats = db.get_stats(filter).context("failed to compute stats")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    let status = db.get_sync_status()?;
    let t = &stats.tokens;

    println!(
        "Sessions: {}   Cost: {}   Avg/session: {}",
        stats.total_sessions,
        format_cost(stats.total_cost),
        format_cost(stats.avg_cost_per_session)
    );
    println!(
        "Tokens: {} (in {}, out {}, cache read {}, cache write {})",
        format_tokens(stats.total_tokens),
        format_tokens(t.input_tokens),
        format_tokens(t.output_tokens),
        format_tokens(t.cache_read_tokens),
        format_tokens(t.cache_create_tokens)
    );
    println!(
        "Last synced: {}",
        format_relative_time(status.last_synced_at.as_deref(), Utc::now())
    );

    if !stats.by_model.is_empty() {
        println!("\nBy model:");
        for g in stats.by_model.iter().take(BREAKDOWN_ROWS) {
            println!(
                "  {:<28} {:>5} sessions  {:>10}  {:>8} tokens",
                short_model_name(&g.key),
                g.sessions,
                format_cost(g.cost),
                format_tokens(g.tokens)
            );
        }
    }

    if !stats.by_project.is_empty() {
        println!("\nBy project:");
        for g in stats.by_project.iter().take(BREAKDOWN_ROWS) {
            println!(
                "  {:<28} {:>5} sessions  {:>10}  {:>8} tokens",
                g.key,
                g.sessions,
                format_cost(g.cost),
                format_tokens(g.tokens)
            );
        }
    }

    if !stats.top_tools.is_empty() {
        println!("\nTop tools:");
        for tool in stats.top_tools.iter().take(BREAKDOWN_ROWS) {
            println!("  {:<28} {:>6}", tool.tool, tool.count);
        }
    }

    Ok(())
}

fn print_sessions(db: &Database, filter: &SessionFilter) -> Result<()> {
    let page = db.list_sessions(filter).context("failed to list sessions")?;

    for s in &page.sessions {
        let started = s
            .started_at
            .as_deref()
            .map(|ts| ts.chars().take(16).collect::<String>())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}  {:<16}  {:<20}  {:<8}  {:>9}  {:>7}  {:>8}  {}",
            s.id,
            started,
            clip(&s.project, 20),
            s.model.as_deref().map(short_model_name).unwrap_or("-"),
            format_cost(s.estimated_cost_usd),
            format_tokens(s.tokens.total()),
            format_duration_ms(s.duration_ms),
            s.first_prompt
                .as_deref()
                .map(|p| clip(p, 60))
                .unwrap_or_default()
        );
    }

    println!(
        "Showing {} of {} sessions",
        page.sessions.len(),
        page.total
    );
    Ok(())
}
