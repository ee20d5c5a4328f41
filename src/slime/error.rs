//! Sink protocol error types

use thiserror::Error;

/// Errors that can occur in the sink codec and sessions
#[derive(Error, Debug)]
pub enum SlimeError {
    /// Socket operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Inbound frame shorter than its layout requires
    #[error("Truncated frame: expected at least {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    /// MAC address string could not be parsed
    #[error("Invalid MAC address: {0}")]
    InvalidMac(String),

    /// Operation requires a running session
    #[error("Session not running")]
    NotRunning,
}

/// Result type alias for sink operations
pub type SlimeResult<T> = Result<T, SlimeError>;
