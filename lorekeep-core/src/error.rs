//! Error types for lorekeep-core

use thiserror::Error;

/// Main error type for the lorekeep-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JUnit XML report
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Parse error for an input artifact
    #[error("parse error in {artifact}: {message}")]
    Parse { artifact: String, message: String },

    /// Unknown diagnostics tool name
    #[error("unknown lint tool: {0}")]
    UnknownTool(String),

    /// Store-level error (collection missing, batch shape mismatch)
    #[error("store error: {0}")]
    Store(String),
}

/// Result type alias for lorekeep-core
pub type Result<T> = std::result::Result<T, Error>;
