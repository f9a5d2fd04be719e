//! Storage-level errors and their conversion into the engine error type.

use thiserror::Error;
use visitsync_core::errors::{DatabaseError, Error};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(#[from] diesel::ConnectionError),

    #[error("Connection pool error: {0}")]
    PoolError(#[from] diesel::r2d2::PoolError),

    #[error("Query failed: {0}")]
    QueryFailed(#[from] diesel::result::Error),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Write actor unavailable: {0}")]
    WriterUnavailable(String),

    #[error("Invalid stored value: {0}")]
    InvalidData(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        let db_err = match err {
            StorageError::ConnectionFailed(e) => DatabaseError::ConnectionFailed(e.to_string()),
            StorageError::PoolError(e) => DatabaseError::PoolCreationFailed(e.to_string()),
            StorageError::QueryFailed(e) => DatabaseError::QueryFailed(e.to_string()),
            StorageError::MigrationFailed(msg) => DatabaseError::MigrationFailed(msg),
            StorageError::WriterUnavailable(msg) => DatabaseError::Internal(msg),
            StorageError::InvalidData(msg) => DatabaseError::Internal(msg),
            StorageError::Io(e) => DatabaseError::ConnectionFailed(e.to_string()),
        };
        Error::Database(db_err)
    }
}
