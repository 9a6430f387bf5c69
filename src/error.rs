//! Error types for Schema-Browser
//!
//! This module defines the error types used throughout the application.
//! The first five variants are the failures the session core reports to its
//! callers; the rest belong to configuration, storage and the CLI.

use thiserror::Error;

/// Result type alias for Schema-Browser
pub type Result<T> = std::result::Result<T, BrowserError>;

/// Main error type for Schema-Browser
#[derive(Error, Debug)]
pub enum BrowserError {
    /// No live connection is available for the requested operation
    #[error("Not connected to a database")]
    NotConnected,

    /// Opening a connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The submitted SQL was empty or whitespace only
    #[error("Query is empty")]
    EmptyQuery,

    /// The server rejected or failed to run a statement
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// A catalog lookup failed
    #[error("Metadata query failed: {0}")]
    MetadataQueryFailed(String),

    /// IO-related errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Command syntax errors
    #[error("Invalid syntax for {command}, expected: {expected}")]
    InvalidCommandSyntax { command: String, expected: String },

    /// Unknown REPL command
    #[error("Unknown command: {0}")]
    UnknownCommand(String),
}

impl From<toml::de::Error> for BrowserError {
    fn from(err: toml::de::Error) -> Self {
        BrowserError::Config(format!("Failed to parse TOML: {}", err))
    }
}

impl From<toml::ser::Error> for BrowserError {
    fn from(err: toml::ser::Error) -> Self {
        BrowserError::Config(format!("Failed to serialize TOML: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            BrowserError::QueryFailed("syntax error at or near \"SELEC\"".into()).to_string(),
            "Query failed: syntax error at or near \"SELEC\""
        );
        assert_eq!(BrowserError::NotConnected.to_string(), "Not connected to a database");
    }
}
