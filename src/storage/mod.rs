//! Durable storage for custody state.

pub mod sqlite;

use thiserror::Error;

pub use sqlite::{LoadedState, SqliteStateStore};

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("invalid data: {0}")]
    InvalidData(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
