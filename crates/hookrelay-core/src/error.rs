//! Error types for storage and model operations.
//!
//! Every failure of the key-value store collaborator surfaces as a
//! `CoreError`, so the delivery engine only has to handle one storage error
//! type regardless of the backend in use.

use thiserror::Error;

/// Result type alias using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core error type for storage and model operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Backend operation failed.
    #[error("Database error: {0}")]
    Database(String),

    /// Stored value could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_errors_become_serialization_errors() {
        let err = serde_json::from_str::<u32>("\"nope\"").unwrap_err();
        let core: CoreError = err.into();
        assert!(matches!(core, CoreError::Serialization(_)));
    }

    #[test]
    fn display_includes_context() {
        let err = CoreError::Database("connection reset".to_string());
        assert_eq!(err.to_string(), "Database error: connection reset");
    }
}
