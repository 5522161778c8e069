//! Error types for localdb
//!
//! Covers the start/stop lifecycle of the embedded database as well as
//! query failures on a live handle.

use thiserror::Error;

/// Database error type
#[derive(Error, Debug)]
pub enum DbError {
    /// `start` was called while a database is already open.
    #[error("database already started")]
    AlreadyStarted,

    /// A handle was requested before `start` or after `stop`.
    #[error("database not started")]
    NotStarted,

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for database operations
pub type DbResult<T> = Result<T, DbError>;
