//! Storage Layer
//!
//! Provides the [`Store`] contract with an in-memory repository and a SQLite
//! repository behind it.

mod models;
mod repository;
mod sqlite;
mod store;

pub use models::{
    ArchivedIncident, Comment, CommentId, CorrectiveAction, Incident, IncidentId, IncidentStatus,
    NewReading, Reading, ReadingId, ThresholdConfig, ACTION_SLOTS,
};
pub use repository::Repository;
pub use sqlite::SqliteRepository;
pub use store::Store;

use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Record not found")]
    NotFound,
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StorageError::NotFound,
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StorageError::Conflict(db.message().to_string())
            }
            other => StorageError::DatabaseError(other.to_string()),
        }
    }
}

impl From<postcard::Error> for StorageError {
    fn from(err: postcard::Error) -> Self {
        StorageError::SerializationError(err.to_string())
    }
}
