//! Error types shared by the database layer and its callers.

use crate::tle::TleError;

/// Result type for OMP operations
pub type OmpResult<T> = Result<T, OmpError>;

/// Normalized error type for OMP operations.
///
/// Backend-specific driver errors are translated into [`OmpError::Database`]
/// at the transaction boundary, so callers never need to depend on a
/// particular database client library.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OmpError {
    /// Operation rejected by the read-only policy (or by a caller-level precondition).
    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    /// Error raised by the database driver, carrying the driver's message.
    #[error("Database error: {0}")]
    Database(String),

    /// The cursor could not be closed after an otherwise successful unit of work.
    #[error("Failed to close cursor: {0}")]
    CursorClose(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unknown OMP state code {0}")]
    UnknownState(i64),

    #[error(transparent)]
    Tle(#[from] TleError),

    #[error("HTTP error: {0}")]
    Http(String),
}

impl OmpError {
    /// Whether this error originated in the database driver rather than in
    /// application logic.
    pub fn is_driver_error(&self) -> bool {
        matches!(
            self,
            OmpError::Database(_) | OmpError::CursorClose(_) | OmpError::Connection(_)
        )
    }

    /// Whether this error is a read-only policy rejection.
    pub fn is_policy_violation(&self) -> bool {
        matches!(self, OmpError::PolicyViolation(_))
    }
}
