use thiserror::Error;

/// The protocol-level error taxonomy. Each variant carries the exact wire
/// error code and the HTTP status the router maps it to.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid payload")]
    InvalidPayload,

    #[error("unknown endpoint")]
    UnknownEndpoint,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("unsigned envelope required")]
    UnsignedEnvelopeRequired,

    #[error("source node mismatch: expected {expected}, got {actual}")]
    SourceNodeMismatch { expected: String, actual: String },

    #[error("target node mismatch: expected {expected}, got {actual}")]
    TargetNodeMismatch { expected: String, actual: String },

    #[error("source key does not bind to claimed node rid")]
    SourceKeyRidMismatch,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    Storage(String),
}

impl Error {
    /// The wire protocol error code returned in `{"error_code": ...}`.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidPayload => "INVALID_PAYLOAD",
            Error::UnknownEndpoint => "UNKNOWN_ENDPOINT",
            Error::InvalidSignature => "INVALID_SIGNATURE",
            Error::UnsignedEnvelopeRequired => "UNSIGNED_ENVELOPE_REQUIRED",
            Error::SourceNodeMismatch { .. } => "SOURCE_NODE_MISMATCH",
            Error::TargetNodeMismatch { .. } => "TARGET_NODE_MISMATCH",
            Error::SourceKeyRidMismatch => "SOURCE_KEY_RID_MISMATCH",
            Error::Serialization(_) => "INVALID_PAYLOAD",
            Error::Storage(_) => "STORAGE_ERROR",
        }
    }

    /// HTTP status this error should be reported with.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::InvalidPayload | Error::UnknownEndpoint | Error::Serialization(_) => 400,
            Error::InvalidSignature
            | Error::UnsignedEnvelopeRequired
            | Error::SourceNodeMismatch { .. }
            | Error::TargetNodeMismatch { .. }
            | Error::SourceKeyRidMismatch => 401,
            Error::Storage(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
