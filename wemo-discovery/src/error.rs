//! Error types for the discovery system.

use std::fmt;

/// Error type for discovery operations.
#[derive(Debug)]
pub enum DiscoveryError {
    /// Network-related errors (socket creation, send, interface listing)
    NetworkError(String),
    /// A LOCATION header that is not a valid URI
    ParseError(String),
    /// No interface with the requested name exists
    InterfaceNotFound(String),
    /// The interface exists but carries no usable IPv4 address
    NoIpv4Address(String),
}

impl fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            DiscoveryError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            DiscoveryError::InterfaceNotFound(name) => {
                write!(f, "Unable to find interface: {}", name)
            }
            DiscoveryError::NoIpv4Address(name) => {
                write!(f, "Unable to find IPv4 address associated with interface: {}", name)
            }
        }
    }
}

impl std::error::Error for DiscoveryError {}

/// Convenience Result type alias for discovery operations.
pub type Result<T> = std::result::Result<T, DiscoveryError>;
