//! Mapping from `SeaORM` errors to storage contract errors.

use coffer_core::storage::StorageError;
use sea_orm::{DbErr, SqlErr};

/// Converts a database error on `entity` (addressed by `key`) into a `StorageError`.
///
/// Unique violations become `AlreadyExists`, foreign-key violations become
/// `NotFound` of the referenced row, and connection failures `Unavailable`.
pub(crate) fn storage_err(
    entity: &'static str,
    key: impl Into<String>,
    err: DbErr,
) -> StorageError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => StorageError::already_exists(entity, key),
        Some(SqlErr::ForeignKeyConstraintViolation(detail)) => {
            StorageError::not_found("referenced row", detail)
        }
        _ => match err {
            DbErr::ConnectionAcquire(_) | DbErr::Conn(_) => {
                tracing::warn!(entity, error = %err, "database unavailable");
                StorageError::Unavailable(err.to_string())
            }
            other => {
                tracing::error!(entity, error = %other, "database operation failed");
                StorageError::backend(other.to_string())
            }
        },
    }
}

/// Error for a stored value that no longer parses into its domain type.
pub(crate) fn corrupt(entity: &'static str, field: &str, value: &str) -> StorageError {
    tracing::error!(entity, field, value, "stored value does not parse");
    StorageError::backend(format!("{entity}.{field} holds invalid value '{value}'"))
}
