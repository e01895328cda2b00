//! Error types for the wemo-stream crate.

use callback_server::ServerError;
use wemo_api::{ApiError, SubscriptionStatus};

/// Errors raised by the subscription manager, listener and broker.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// A device call failed
    #[error("Device API error: {0}")]
    Api(#[from] ApiError),

    /// The device answered SUBSCRIBE with something other than 200 and a SID
    #[error("Subscription to {host} rejected with status {status}: {reason}")]
    SubscriptionRejected {
        host: String,
        status: u16,
        reason: &'static str,
    },

    /// The inbound event listener could not start
    #[error("Event listener error: {0}")]
    Listener(String),

    /// Invalid configuration provided
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An error occurred during shutdown
    #[error("Shutdown error: {0}")]
    Shutdown(String),

    /// No subscription with this SID or host
    #[error("Subscription not found: {0}")]
    NotFound(String),
}

impl StreamError {
    pub(crate) fn rejected(host: &str, status: u16) -> Self {
        Self::SubscriptionRejected {
            host: host.to_string(),
            status,
            reason: SubscriptionStatus::from_code(status).describe(),
        }
    }
}

impl From<ServerError> for StreamError {
    fn from(error: ServerError) -> Self {
        Self::Listener(error.to_string())
    }
}

/// Convenience type alias for Results using StreamError.
pub type Result<T> = std::result::Result<T, StreamError>;
