//! Error types for claude-deck-core

use thiserror::Error;

/// Main error type for the claude-deck-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A log file could not be turned into an aggregate
    #[error("parse error in {file}: {message}")]
    Parse { file: String, message: String },

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Session not found
    #[error("session not found: {0}")]
    SessionNotFound(String),
}

/// Result type alias for claude-deck-core
pub type Result<T> = std::result::Result<T, Error>;
