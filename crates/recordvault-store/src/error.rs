//! Error types for the store module.

use recordvault_core::{ContentAddress, ValidationError};
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Nothing stored under this key.
    #[error("not found: {0}")]
    NotFound(String),

    /// The backend could not be reached. Transient; callers may retry.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Returned bytes do not hash to the requested address.
    #[error("integrity violation: bytes returned for {expected} hash to {actual}")]
    IntegrityViolation {
        expected: ContentAddress,
        actual: ContentAddress,
    },

    /// A submitted transaction failed signature, structure or chain checks.
    #[error("transaction rejected: {0}")]
    Validation(#[from] ValidationError),

    /// Stored data could not be decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// An internal lock was poisoned.
    #[error("store lock poisoned")]
    Poisoned,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Unavailable(_) => true,
            StoreError::Database(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
