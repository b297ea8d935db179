//! Storage layer for the Cadence backend.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

pub mod error;
pub mod log_repository;
pub mod push_repository;
pub mod schedule_repository;
pub mod session_repository;
pub mod suggestion_repository;
pub mod task_repository;

pub use error::StorageError;
pub use log_repository::LogRepository;
pub use push_repository::PushRepository;
pub use schedule_repository::{DailyScheduleRow, ScheduleRepository, WeeklyScheduleRow};
pub use session_repository::{ActiveSessionRow, SessionCheckout, SessionRepository};
pub use suggestion_repository::{DecisionOutcome, NewSuggestion, SuggestionRepository};
pub use task_repository::TaskRepository;

/// Create a PostgreSQL connection pool.
pub async fn create_pool(database_url: &str) -> Result<PgPool, StorageError> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .map_err(StorageError::Connection)
}

/// Run database migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), StorageError> {
    sqlx::migrate!("../../migrations")
        .run(pool)
        .await
        .map_err(StorageError::Migration)
}

/// Check database connectivity.
pub async fn check_connection(pool: &PgPool) -> Result<(), StorageError> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map_err(StorageError::Query)?;
    Ok(())
}
