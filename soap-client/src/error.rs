//! Error types for the SOAP client

use thiserror::Error;

/// Errors that can occur while talking to a device
#[derive(Debug, Error)]
pub enum SoapError {
    /// Dial, read or write failure, including timeouts
    #[error("Network/HTTP error: {0}")]
    Network(String),

    /// The device answered with bytes that are not a usable HTTP response
    #[error("Response parsing error: {0}")]
    Parse(String),
}
