//! Analytics for claude-deck
//!
//! Derived views computed on read from stored sessions. Aggregate totals
//! live in SQL ([`crate::db::Database::get_stats`]); per-session behavioral
//! analysis lives in [`insights`].

pub mod insights;

pub use insights::{
    compute_insights, CompactionSummary, FileReadPattern, SessionInsights, SessionPhase,
    ToolCategory, ToolCount, WebFetchDetail, WebFetchSummary,
};
