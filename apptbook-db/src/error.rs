//! Error types for the database layer.

use apptbook_license::LicenseError;
use thiserror::Error;

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

/// Errors that can occur in database operations.
#[derive(Debug, Error)]
pub enum DbError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored value could not be decoded.
    #[error("invalid data in column {column}: {value}")]
    InvalidData {
        /// Column holding the value.
        column: &'static str,
        /// The raw stored value.
        value: String,
    },

    /// A previous holder of the connection panicked.
    #[error("database connection lock poisoned")]
    LockPoisoned,

    /// IO error (file system).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<DbError> for LicenseError {
    fn from(err: DbError) -> Self {
        LicenseError::Storage(err.to_string())
    }
}
