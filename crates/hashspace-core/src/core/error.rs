//! Error types for hashspace operations.

use std::io;
use thiserror::Error;

use crate::literal::Hash;

/// Result type for hashspace operations.
pub type Result<T> = std::result::Result<T, HashspaceError>;

/// Errors that can occur while literalizing, storing or mutating objects.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HashspaceError {
    #[error("Malformed literal: {0}")]
    MalformedLiteral(String),

    #[error("Missing dependency: {0}")]
    MissingDependency(Hash),

    #[error("Cyclic dependency through {0}")]
    CyclicDependency(Hash),

    #[error("Unknown class: {0}")]
    UnknownClass(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Unauthorized mutation: {0}")]
    UnauthorizedMutation(String),

    #[error("Object has no id, cannot derive field {0}")]
    MissingId(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Crypto error: {0}")]
    Crypto(String),
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for HashspaceError {
    fn from(err: rusqlite::Error) -> Self {
        HashspaceError::Storage(err.to_string())
    }
}

impl HashspaceError {
    /// Check if retrying later (after a fetch) could succeed.
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            HashspaceError::MissingDependency(_) | HashspaceError::Io(_)
        )
    }

    /// Check if the input was rejected on its content; the same bytes will
    /// never be accepted.
    #[inline]
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            HashspaceError::MalformedLiteral(_)
                | HashspaceError::CyclicDependency(_)
                | HashspaceError::UnknownClass(_)
                | HashspaceError::ValidationFailed(_)
                | HashspaceError::UnauthorizedMutation(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_dependency_is_retryable() {
        let err = HashspaceError::MissingDependency(Hash::from_hex("ab"));
        assert!(err.is_retryable());
        assert!(!err.is_rejection());
    }

    #[test]
    fn test_validation_is_rejection() {
        let err = HashspaceError::ValidationFailed("bad signature".into());
        assert!(err.is_rejection());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_unauthorized_message() {
        let err = HashspaceError::UnauthorizedMutation("grant by stranger".into());
        assert_eq!(err.to_string(), "Unauthorized mutation: grant by stranger");
    }
}
