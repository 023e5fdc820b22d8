//! # claude-deck-core
//!
//! Core library for claude-deck - cost and activity reports over Claude Code
//! session logs.
//!
//! This library provides:
//! - A line-tolerant decoder for the agent's JSONL records
//! - Session and sub-agent parsers that aggregate usage, cost, tool calls and turns
//! - An incremental ingestion walker that skips unchanged files
//! - SQLite storage with atomic per-session replacement
//! - Aggregate stats and per-session behavioral insights
//! - Configuration and logging infrastructure
//!
//! ## Architecture
//!
//! Data flows through three stages:
//! - **Logs:** `~/.claude/projects/**.jsonl`, read-only and append-mostly
//! - **Store:** one row set per session, replaced whenever its file's mtime changes
//! - **Reports:** stats, timelines and insights computed from the store on read
//!
//! ## Example
//!
//! ```rust,no_run
//! use claude_deck_core::{Config, Database, IngestCoordinator};
//!
//! let config = Config::load().expect("failed to load config");
//!
//! let db = Database::open(&Config::database_path()).expect("failed to open database");
//! db.migrate().expect("failed to run migrations");
//!
//! let result = IngestCoordinator::new(db, config.claude_dir())
//!     .sync_all()
//!     .expect("sync failed");
//! println!("{} sessions", result.total_sessions);
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use db::{Database, SessionFilter};
pub use error::{Error, Result};
pub use ingest::{IngestCoordinator, SyncResult};
pub use pricing::PricingTable;
pub use types::*;

// Public modules
pub mod analytics;
pub mod config;
pub mod db;
pub mod error;
pub mod format;
pub mod ingest;
pub mod logging;
pub mod pricing;
pub mod types;
