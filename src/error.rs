//! Error types for the SQL sandbox.
//!
//! Query outcomes (rejections, database faults, timeouts) are reported as
//! [`ExecutionResult`](crate::query::ExecutionResult) values. This enum covers
//! the infrastructure around them: connecting, configuration, history
//! persistence and request-shape problems.

use thiserror::Error;

/// Main error type for sandbox operations.
#[derive(Error, Debug)]
pub enum SandboxError {
    /// Database connection errors (host unreachable, auth failed, etc.)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query errors raised outside the sandboxed execution path (seeding, setup).
    #[error("Query error: {0}")]
    Query(String),

    /// Configuration errors (invalid config file, out-of-range values, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// History store errors. Never surfaced to query callers.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// A single-writer operation is already in progress.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The request itself is malformed (empty compare list, limits exceeded).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Internal application errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SandboxError {
    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a query error with the given message.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a persistence error with the given message.
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// Creates a conflict error with the given message.
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Creates an invalid-request error with the given message.
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "Connection Error",
            Self::Query(_) => "Query Error",
            Self::Config(_) => "Configuration Error",
            Self::Persistence(_) => "Persistence Error",
            Self::Conflict(_) => "Conflict",
            Self::InvalidRequest(_) => "Invalid Request",
            Self::Internal(_) => "Internal Error",
        }
    }
}

/// Result type alias using SandboxError.
pub type Result<T> = std::result::Result<T, SandboxError>;
