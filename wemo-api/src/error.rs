use soap_client::SoapError;
use thiserror::Error;

/// Errors from state-changing and structured device operations
#[derive(Debug, Error)]
pub enum ApiError {
    /// The exchange with the device failed (dial, timeout, read)
    #[error("Transport error: {0}")]
    Transport(#[from] SoapError),

    /// The device answered with a non-2xx status
    #[error("{action} returned HTTP status {status}")]
    Status { action: String, status: u16 },

    /// The response could not be decoded
    #[error("Parse error: {0}")]
    Parse(String),

    /// A successful response did not carry the expected element
    #[error("Response is missing {0}")]
    MissingField(String),

    /// The current state could not be read, so no action was taken
    #[error("Current state unknown: {0}")]
    UnknownState(#[from] Unknown),

    /// A bulb command or value outside the supported vocabulary
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// The bridge listed the target in `ErrorDeviceIDs`
    #[error("Device rejected command for {0}")]
    DeviceRejected(String),
}

/// Type alias for results that can return an ApiError
pub type Result<T> = std::result::Result<T, ApiError>;

/// Outcome of a best-effort read that could not determine a value.
///
/// Kept distinct from a confirmed value so callers can tell "off" from
/// "could not ask".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct Unknown {
    pub reason: String,
}

impl Unknown {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}
