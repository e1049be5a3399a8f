//! Shared error type across bloner crates.

use thiserror::Error;

/// Client-facing error codes (stable API, carried in `error` envelopes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCode {
    /// Malformed line, bad JSON, or payload schema mismatch.
    BadRequest,
    /// Envelope `type` outside the message catalogue.
    UnknownType,
    /// Message type not valid in the connection's current phase.
    NotAllowed,
    /// Unsupported config/protocol version.
    UnsupportedVersion,
    /// Internal relay error.
    Internal,
}

impl ClientCode {
    /// String representation used in JSON payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            ClientCode::BadRequest => "BAD_REQUEST",
            ClientCode::UnknownType => "UNKNOWN_TYPE",
            ClientCode::NotAllowed => "NOT_ALLOWED",
            ClientCode::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ClientCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Unified error type used by core and relay.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unknown message type: {0}")]
    UnknownType(String),
    #[error("not allowed: {0}")]
    NotAllowed(String),
    #[error("unsupported version")]
    UnsupportedVersion,
    #[error("transport: {0}")]
    Transport(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl RelayError {
    /// Map internal error to a stable client-facing code.
    pub fn client_code(&self) -> ClientCode {
        match self {
            RelayError::BadRequest(_) => ClientCode::BadRequest,
            RelayError::UnknownType(_) => ClientCode::UnknownType,
            RelayError::NotAllowed(_) => ClientCode::NotAllowed,
            RelayError::UnsupportedVersion => ClientCode::UnsupportedVersion,
            RelayError::Transport(_) | RelayError::Internal(_) => ClientCode::Internal,
        }
    }
}
