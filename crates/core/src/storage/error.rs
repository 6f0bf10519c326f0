//! Storage error types.

use thiserror::Error;

/// Errors reported by storage collaborators.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A unique key is already taken.
    #[error("{entity} already exists: {key}")]
    AlreadyExists {
        /// Entity kind, e.g. `balance_log`.
        entity: &'static str,
        /// The conflicting key.
        key: String,
    },

    /// A record addressed by key does not exist.
    #[error("{entity} not found: {key}")]
    NotFound {
        /// Entity kind.
        entity: &'static str,
        /// The missing key.
        key: String,
    },

    /// The backend rejected or failed the operation.
    #[error("storage operation failed: {0}")]
    Backend(String),

    /// The backend is temporarily unreachable.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    /// Create an already-exists error.
    #[must_use]
    pub fn already_exists(entity: &'static str, key: impl Into<String>) -> Self {
        Self::AlreadyExists {
            entity,
            key: key.into(),
        }
    }

    /// Create a not found error.
    #[must_use]
    pub fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            key: key.into(),
        }
    }

    /// Create a backend error.
    #[must_use]
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Returns true for unique-key conflicts.
    #[must_use]
    pub const fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// Returns true if the operation may succeed when retried.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            StorageError::already_exists("balance_log", "ref-1").to_string(),
            "balance_log already exists: ref-1"
        );
        assert_eq!(
            StorageError::not_found("balance", "u1/USD").to_string(),
            "balance not found: u1/USD"
        );
        assert_eq!(
            StorageError::backend("connection reset").to_string(),
            "storage operation failed: connection reset"
        );
    }

    #[test]
    fn test_classification() {
        assert!(StorageError::already_exists("x", "k").is_already_exists());
        assert!(!StorageError::backend("x").is_already_exists());
        assert!(StorageError::Unavailable("pool".into()).is_transient());
        assert!(!StorageError::backend("x").is_transient());
    }
}
