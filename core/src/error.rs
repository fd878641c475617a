//! Harness error types and utilities

use crate::exit::ServerExit;
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the harness
///
/// Every variant carries the literal path or the raw diagnostic text of the
/// subsystem that failed, so a failing test points straight at the cause.
#[derive(Error, Debug)]
pub enum HarnessError {
    /// The server executable does not exist or is not executable
    #[error("Server executable not found at {}: {hint}", path.display())]
    NotFound {
        /// Resolved path that was checked
        path: PathBuf,
        /// Human-actionable build step
        hint: String,
    },

    /// Spawning, waiting on or querying a process failed
    #[error("Process error: {0}")]
    Process(String),

    /// Structured output could not be decoded
    #[error("Parse error: {message}; raw output: {raw}")]
    Parse {
        /// Decoder diagnostic
        message: String,
        /// Raw text that failed to decode
        raw: String,
    },

    /// Filesystem operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Probe request failed or its reply was not JSON
    #[error("Network error: {0}")]
    Network(String),

    /// The supervised server exited without a requested shutdown
    #[error("Server exited unexpectedly: {0}")]
    UnexpectedExit(ServerExit),

    /// `close` on a handle that is no longer running
    #[error("Server handle already closed")]
    AlreadyClosed,

    /// A configured timeout elapsed
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// Invalid configuration or misuse of the harness API
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl HarnessError {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            HarnessError::NotFound { .. } => "HAR001",
            HarnessError::Process(_) => "HAR002",
            HarnessError::Parse { .. } => "HAR003",
            HarnessError::Io(_) => "HAR004",
            HarnessError::Network(_) => "HAR005",
            HarnessError::UnexpectedExit(_) => "HAR006",
            HarnessError::AlreadyClosed => "HAR007",
            HarnessError::Timeout(_) => "HAR008",
            HarnessError::Configuration(_) => "HAR009",
        }
    }

    /// Whether this error means the test environment itself is broken
    pub fn is_fatal(&self) -> bool {
        matches!(self, HarnessError::UnexpectedExit(_))
    }
}

/// Harness result type
pub type Result<T> = std::result::Result<T, HarnessError>;
