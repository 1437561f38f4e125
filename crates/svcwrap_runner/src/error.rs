//! Error types for the runner module.

use thiserror::Error;

/// Result type alias for runner operations.
pub type RunnerResult<T> = Result<T, RunnerError>;

/// Errors that can occur while compiling, spawning or supervising a process.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Failed to spawn process: {0}")]
    Spawn(String),

    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Invalid command template: {0}")]
    InvalidCommand(String),

    #[error("Failed to signal process {pid}: {message}")]
    Signal { pid: u32, message: String },

    #[error("Supervisor task failed: {0}")]
    Supervisor(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
