//! Error types for the SQLite storage implementation.

use matchlink_store_traits::StoreError;

/// Error type for SQLite storage operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// SQLite database error
    #[error("Database error: {0}")]
    Database(String),
    /// Error from rusqlite
    #[error("SQLite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
    /// Error during database migration
    #[error("Migration error: {0}")]
    Refinery(#[from] refinery::Error),
    /// Input validation error
    #[error("{field_name} exceeds maximum length of {max_size} bytes (got {actual_size} bytes)")]
    Validation {
        /// Name of the field that failed validation
        field_name: String,
        /// Maximum allowed size/length in bytes
        max_size: usize,
        /// Actual size/length in bytes
        actual_size: usize,
    },
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Database(format!("IO error: {}", e))
    }
}

impl From<Error> for StoreError {
    fn from(err: Error) -> Self {
        match err {
            Error::Validation { .. } => StoreError::InvalidParameters(err.to_string()),
            other => StoreError::Database(other.to_string()),
        }
    }
}

#[inline]
pub(crate) fn into_store_err<T>(e: T) -> StoreError
where
    T: std::error::Error,
{
    StoreError::Database(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_maps_to_invalid_parameters() {
        let err = Error::Validation {
            field_name: "Event payload".to_string(),
            max_size: 10,
            actual_size: 12,
        };
        let store_err: StoreError = err.into();
        assert_eq!(
            store_err,
            StoreError::InvalidParameters(
                "Event payload exceeds maximum length of 10 bytes (got 12 bytes)".to_string()
            )
        );
    }

    #[test]
    fn test_io_error_maps_to_database() {
        let err: Error = std::io::Error::other("disk full").into();
        let store_err: StoreError = err.into();
        assert!(matches!(store_err, StoreError::Database(msg) if msg.contains("disk full")));
    }
}
