//! Database layer for claude-deck
//!
//! This module provides the storage layer using SQLite with:
//! - Schema migrations
//! - Atomic per-session replacement on re-parse
//! - The read-side query surface for lists, detail and stats

pub mod repo;
pub mod schema;

pub use repo::{
    Database, GroupStat, SessionFilter, SessionPage, SessionRow, SessionSort, Stats, StatsFilter,
    SyncStatus,
};
