//! Error type shared by the store, the dispatcher and the server.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VemcacheError {
    /// Malformed request: unknown command, wrong arity, unparsable number
    #[error("{0}")]
    Protocol(String),

    #[error("key '{0}' not found")]
    NotFound(String),

    #[error("dimension mismatch: {left} != {right}")]
    DimensionMismatch { left: usize, right: usize },

    #[error("{0}")]
    InvalidArgument(String),

    /// A broken internal invariant, never caused by the client
    #[error("{0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),
}

impl VemcacheError {
    /// Stable token used in `ERR <kind>: <detail>` response lines.
    pub fn kind(&self) -> &'static str {
        match self {
            VemcacheError::Protocol(_) => "protocol",
            VemcacheError::NotFound(_) => "not_found",
            VemcacheError::DimensionMismatch { .. } => "dimension_mismatch",
            VemcacheError::InvalidArgument(_) => "invalid_argument",
            VemcacheError::Internal(_)
            | VemcacheError::Io(_)
            | VemcacheError::Json(_)
            | VemcacheError::Bincode(_) => "internal",
        }
    }

    /// True for failures the client caused and can recover from.
    pub fn is_client_error(&self) -> bool {
        self.kind() != "internal"
    }

    pub(crate) fn protocol(msg: impl Into<String>) -> Self {
        VemcacheError::Protocol(msg.into())
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        VemcacheError::InvalidArgument(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, VemcacheError>;
