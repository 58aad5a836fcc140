//! Error types for sdnipd.

use sdnip_types::{IpAddress, ParseError};
use thiserror::Error;

/// Errors that can occur in the SDN-IP control plane.
#[derive(Debug, Error)]
pub enum SdnIpError {
    /// Configuration missing or inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed address, prefix or MAC
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Remote intent store rejected or failed an operation
    #[error("Intent store error: {0}")]
    Store(String),

    /// Route update carried a kind this pipeline does not understand
    #[error("Unknown route update kind: {0}")]
    UnknownUpdateKind(String),

    /// No configured interface reaches the next hop
    #[error("No egress interface for next hop {0}")]
    NoEgressInterface(IpAddress),

    /// A worker task has stopped and no longer accepts work
    #[error("{0} worker is not running")]
    ChannelClosed(&'static str),
}

/// Result type alias for sdnipd operations
pub type Result<T> = std::result::Result<T, SdnIpError>;
