//! Storage errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection error: {0}")]
    Connection(#[source] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),

    #[error("Query error: {0}")]
    Query(#[source] sqlx::Error),

    #[error("Unique constraint violated")]
    UniqueViolation(#[source] sqlx::Error),
}

impl StorageError {
    /// Wrap a query error, distinguishing unique-constraint conflicts so the
    /// service layer can map them to 409.
    pub fn from_query(err: sqlx::Error) -> Self {
        let is_unique = err
            .as_database_error()
            .map(|db| db.is_unique_violation())
            .unwrap_or(false);
        if is_unique {
            StorageError::UniqueViolation(err)
        } else {
            StorageError::Query(err)
        }
    }
}
