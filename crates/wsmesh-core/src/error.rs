//! Shared error type across wsMesh crates.

use thiserror::Error;

/// Stable error codes (used in `res` error payloads and logs).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Inbound frame could not be decoded.
    Malformed,
    /// Envelope version differs from ours.
    UnsupportedVersion,
    /// Request got no response in time.
    Timeout,
    /// No socket or sender attached.
    NotConnected,
    /// Connection was closed by the local side.
    Closed,
    /// Socket-level failure.
    Transport,
    /// No handler registered for a request name.
    NoHandler,
    /// Invalid configuration.
    BadConfig,
    /// Internal error.
    Internal,
}

impl ErrorCode {
    /// String representation used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Malformed => "MALFORMED",
            ErrorCode::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::NotConnected => "NOT_CONNECTED",
            ErrorCode::Closed => "CLOSED",
            ErrorCode::Transport => "TRANSPORT",
            ErrorCode::NoHandler => "NO_HANDLER",
            ErrorCode::BadConfig => "BAD_CONFIG",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, MeshError>;

/// Unified error type used by core and peer.
#[derive(Debug, Clone, Error)]
pub enum MeshError {
    #[error("malformed frame: {0}")]
    Malformed(String),
    #[error("unsupported protocol version {got} (expected {expected})")]
    UnsupportedVersion { got: u32, expected: u32 },
    #[error("request '{name}' timed out")]
    Timeout { name: String },
    #[error("not connected")]
    NotConnected,
    #[error("connection closed")]
    Closed,
    #[error("transport: {0}")]
    Transport(String),
    #[error("no handler for '{0}'")]
    NoHandler(String),
    #[error("bad config: {0}")]
    BadConfig(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl MeshError {
    /// Map the error to its stable code.
    pub fn code(&self) -> ErrorCode {
        match self {
            MeshError::Malformed(_) => ErrorCode::Malformed,
            MeshError::UnsupportedVersion { .. } => ErrorCode::UnsupportedVersion,
            MeshError::Timeout { .. } => ErrorCode::Timeout,
            MeshError::NotConnected => ErrorCode::NotConnected,
            MeshError::Closed => ErrorCode::Closed,
            MeshError::Transport(_) => ErrorCode::Transport,
            MeshError::NoHandler(_) => ErrorCode::NoHandler,
            MeshError::BadConfig(_) => ErrorCode::BadConfig,
            MeshError::Internal(_) => ErrorCode::Internal,
        }
    }
}
