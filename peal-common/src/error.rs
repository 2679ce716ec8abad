//! Common error types for Peal
//!
//! Both storage backends report failures through [`Error`] so callers never
//! need backend-specific handling.

use thiserror::Error;

/// Common result type for Peal operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by the storage layer and its callers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Referenced id does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Missing or malformed field, out-of-range value, exceeded slot or touch count
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Uniqueness violation (duplicate touch number within a practice)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Delete would orphan a dependent record, or a write references a missing parent
    #[error("Referential integrity: {0}")]
    ReferentialIntegrity(String),

    /// Data file unwritable or database unreachable; the caller may retry
    #[error("Storage unavailable: {0}")]
    BackendUnavailable(String),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// True when retrying the same call later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::BackendUnavailable(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::BackendUnavailable(format!("I/O error: {}", err))
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        use sqlx::error::ErrorKind;

        match err {
            sqlx::Error::RowNotFound => Error::NotFound("row not found".to_string()),
            sqlx::Error::Database(db_err) => {
                let message = db_err.message().to_string();
                match db_err.kind() {
                    ErrorKind::UniqueViolation => Error::Conflict(message),
                    ErrorKind::ForeignKeyViolation => Error::ReferentialIntegrity(message),
                    ErrorKind::NotNullViolation | ErrorKind::CheckViolation => {
                        Error::Validation(message)
                    }
                    _ => Error::BackendUnavailable(format!("Database error: {}", message)),
                }
            }
            sqlx::Error::Configuration(_) => {
                // Driver configuration errors can echo the connection URL
                Error::Config("invalid database connection settings".to_string())
            }
            other => Error::BackendUnavailable(format!("Database error: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_backend_unavailable_is_retryable() {
        assert!(Error::BackendUnavailable("db down".into()).is_retryable());
        assert!(!Error::Conflict("dup".into()).is_retryable());
        assert!(!Error::Validation("bad".into()).is_retryable());
    }

    #[test]
    fn test_io_error_maps_to_backend_unavailable() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only fs");
        let err: Error = io.into();
        assert!(matches!(err, Error::BackendUnavailable(_)));
    }

    #[test]
    fn test_pool_timeout_maps_to_backend_unavailable() {
        let err: Error = sqlx::Error::PoolTimedOut.into();
        assert!(err.is_retryable());
    }
}
