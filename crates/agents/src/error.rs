//! Agent error types

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Database error: {0}")]
    Database(#[from] graphrag_db::DbError),

    #[error("Core error: {0}")]
    Core(#[from] graphrag_core::CoreError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{operation} timed out after {elapsed:?}")]
    Timeout {
        operation: &'static str,
        elapsed: Duration,
    },

    #[error("Model invocation failed: {0}")]
    ModelInvocationFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Processing error: {0}")]
    Processing(String),
}

impl AgentError {
    /// Whether retrying the same call may succeed.
    ///
    /// Timeouts, connection failures, rate limits and server errors are
    /// transient; malformed input or output is not.
    pub fn is_transient(&self) -> bool {
        match self {
            AgentError::Timeout { .. } => true,
            AgentError::Database(e) => e.is_transient(),
            AgentError::Http(e) => {
                if e.is_timeout() || e.is_connect() {
                    return true;
                }
                e.status()
                    .map(|s| s.as_u16() == 429 || s.is_server_error())
                    .unwrap_or(false)
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
