//! Error taxonomy shared by every component, and the boundary mapping to
//! transport-level status codes.

use thiserror::Error;

/// Every fallible operation in this crate returns `Result<T, EngineError>`.
pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("bad request: {message}")]
    BadRequest { message: String },

    #[error("validation failed: {violation_count} violation(s)")]
    ValidationFailed {
        violation_count: usize,
        violations: Vec<String>,
    },

    #[error("capacity exhausted: {resource}")]
    CapacityExhausted { resource: String },

    #[error("not found: {what}")]
    NotFound { what: String },

    #[error("cancelled: deadline elapsed")]
    Cancelled,

    #[error("internal error: {message}")]
    Internal { message: String },

    #[error("unsupported: {what}")]
    Unsupported { what: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// The taxonomy callers see in the error envelope. One-to-one with the
/// [`EngineError`] variants above, kept separate so the wire format doesn't
/// leak `Display` formatting details.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    BadRequest,
    NotFound,
    CapacityExhausted,
    ValidationFailed,
    Internal,
    Cancelled,
    Unsupported,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::BadRequest { .. } => ErrorKind::BadRequest,
            EngineError::ValidationFailed { .. } => ErrorKind::ValidationFailed,
            EngineError::CapacityExhausted { .. } => ErrorKind::CapacityExhausted,
            EngineError::NotFound { .. } => ErrorKind::NotFound,
            EngineError::Cancelled => ErrorKind::Cancelled,
            EngineError::Unsupported { .. } => ErrorKind::Unsupported,
            EngineError::Internal { .. } | EngineError::Io(_) | EngineError::Serialization(_) => {
                ErrorKind::Internal
            }
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        EngineError::BadRequest { message: message.into() }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        EngineError::NotFound { what: what.into() }
    }

    pub fn capacity_exhausted(resource: impl Into<String>) -> Self {
        EngineError::CapacityExhausted { resource: resource.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        EngineError::Internal { message: message.into() }
    }

    pub fn unsupported(what: impl Into<String>) -> Self {
        EngineError::Unsupported { what: what.into() }
    }

    pub fn validation_failed(violations: Vec<String>) -> Self {
        EngineError::ValidationFailed { violation_count: violations.len(), violations }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for EngineError {
    fn from(e: serde_yaml::Error) -> Self {
        EngineError::Serialization(e.to_string())
    }
}
