//! Error types for one-mcp
//!
//! This module defines all error types used throughout the gateway,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for one-mcp operations
///
/// This enum encompasses all possible errors that can occur during
/// configuration loading, upstream transport I/O, JSON-RPC dispatch,
/// session handling, and store access.
#[derive(Error, Debug)]
pub enum OneMcpError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Upstream server config failed validation (bad name, forbidden
    /// shell metacharacters, missing transport fields)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Transport-level I/O failure (spawn, connect, send)
    #[error("Transport error: {0}")]
    Transport(String),

    /// The upstream client is not ready to serve requests
    #[error("Upstream not ready: {0}")]
    NotReady(String),

    /// A JSON-RPC request to an upstream timed out
    #[error("Upstream timeout: server={server}, method={method}")]
    Timeout {
        /// Upstream server name
        server: String,
        /// JSON-RPC method that timed out
        method: String,
    },

    /// The upstream connection ended while a request was in flight
    #[error("Upstream connection lost: {0}")]
    ConnectionLost(String),

    /// Named upstream server not found in the gateway's active set
    #[error("Upstream server not found: {0}")]
    ServerNotFound(String),

    /// Store errors (database operations)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Downstream session not found in the registry
    #[error("Session not found: {0}")]
    SessionNotFound(String),

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

    /// Internal runtime error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for one-mcp operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;
