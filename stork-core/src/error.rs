use thiserror::Error;

/// Error kinds the core distinguishes, per the fleet monitor's error-handling
/// design: each suspension point returns one of these instead of unwinding.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Malformed IP, malformed prefix, unparseable JSON. Surfaced to the
    /// caller; never retried.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Absent entity on read or update-by-id. Maps to HTTP 404 at the REST
    /// layer.
    #[error("not found: {0}")]
    NotFound(String),

    /// Unique-constraint violation during reconciliation. The losing commit
    /// is rolled back by the caller.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Network-level failure talking to an agent or a Kea control agent.
    /// Retried with exponential backoff by the next puller tick.
    #[error("unreachable: {0}")]
    Unreachable(String),

    /// Bad or expired token/certificate. Not retried.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Unexpected invariant violation. The offending task is aborted; the
    /// system remains live.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::InvalidInput(_) => ErrorKind::InvalidInput,
            CoreError::NotFound(_) => ErrorKind::NotFound,
            CoreError::Conflict(_) => ErrorKind::Conflict,
            CoreError::Unreachable(_) => ErrorKind::Unreachable,
            CoreError::Unauthorized(_) => ErrorKind::Unauthorized,
            CoreError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether a puller should retry this failure on its next tick.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Unreachable(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    Conflict,
    Unreachable,
    Unauthorized,
    Internal,
}

pub type CoreResult<T> = Result<T, CoreError>;
