//! Error types for Docent
//!
//! This module defines all error types used throughout the application,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for Docent operations
///
/// Covers configuration loading, the relay server, the upstream generator,
/// the client-side stream consumer, and thread persistence. Timeouts are a
/// dedicated variant so callers can report "took too long" separately from
/// ordinary transport failures.
#[derive(Error, Debug)]
pub enum DocentError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport-level errors (connection refused, reset mid-stream)
    #[error("Transport error: {0}")]
    Transport(String),

    /// A stream read exceeded its deadline
    #[error("Timed out after {0} seconds waiting for the response")]
    Timeout(u64),

    /// The upstream generator reported a failure
    #[error("Upstream generator error: {0}")]
    Upstream(String),

    /// Thread snapshot storage errors (database operations)
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl DocentError {
    /// Short user-facing string shown inside an errored chat message
    ///
    /// Timeouts get a "took too long" phrasing; everything else gets a
    /// generic retry suggestion. The warning marker prefix is added by the
    /// session layer, not here.
    pub fn chat_message(&self) -> String {
        match self {
            Self::Timeout(_) => "The response took too long. Please try again.".to_string(),
            _ => "Something went wrong while answering. Please try again.".to_string(),
        }
    }
}

/// Result type alias for Docent operations
///
/// Uses `anyhow::Error` as the error type, allowing rich context and easy
/// propagation with `?`.
pub type Result<T> = anyhow::Result<T>;
