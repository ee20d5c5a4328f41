//! OSC error types

use std::net::SocketAddr;
use thiserror::Error;

/// Errors that can occur while receiving or parsing OSC packets
#[derive(Error, Debug)]
pub enum OscError {
    /// Packet did not match the OSC 1.0 layout
    #[error("Malformed packet: {0}")]
    Malformed(String),

    /// Type tag outside the supported set
    #[error("Unsupported type tag: '{0}'")]
    UnsupportedTag(char),

    /// Could not bind the receive socket
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Socket operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for OSC operations
pub type OscResult<T> = Result<T, OscError>;
