//! Rig session error types

use std::net::{Ipv4Addr, SocketAddr};
use thiserror::Error;

/// Errors that can occur while setting up the rig session
#[derive(Error, Debug)]
pub enum AxisError {
    /// Socket operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Binding a receive socket failed
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Joining a multicast group failed
    #[error("Failed to join multicast group {group} on {interface}: {source}")]
    Multicast {
        group: Ipv4Addr,
        interface: Ipv4Addr,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for rig session operations
pub type AxisResult<T> = Result<T, AxisError>;
