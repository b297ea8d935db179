//! Daily and weekly schedule blob persistence.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::StorageError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DailyScheduleRow {
    pub date: NaiveDate,
    pub plan_json: Value,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WeeklyScheduleRow {
    pub week_start_date: NaiveDate,
    pub schedule_json: Value,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ScheduleRepository {
    pool: PgPool,
}

impl ScheduleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn upsert_daily(
        &self,
        user_id: Uuid,
        date: NaiveDate,
        plan_json: &Value,
    ) -> Result<DailyScheduleRow, StorageError> {
        sqlx::query_as::<_, DailyScheduleRow>(
            r#"
            INSERT INTO schedules (user_id, date, plan_json, updated_at)
            VALUES ($1, $2, $3, now())
            ON CONFLICT (user_id, date) DO UPDATE SET
                plan_json = EXCLUDED.plan_json,
                updated_at = now()
            RETURNING date, plan_json, updated_at
            "#,
        )
        .bind(user_id)
        .bind(date)
        .bind(plan_json)
        .fetch_one(&self.pool)
        .await
        .map_err(StorageError::Query)
    }

    pub async fn get_daily(
        &self,
        user_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<DailyScheduleRow>, StorageError> {
        sqlx::query_as::<_, DailyScheduleRow>(
            "SELECT date, plan_json, updated_at FROM schedules WHERE user_id = $1 AND date = $2",
        )
        .bind(user_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::Query)
    }

    pub async fn list_daily(
        &self,
        user_id: Uuid,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<DailyScheduleRow>, StorageError> {
        sqlx::query_as::<_, DailyScheduleRow>(
            r#"
            SELECT date, plan_json, updated_at FROM schedules
            WHERE user_id = $1
            ORDER BY date DESC
            OFFSET $2 LIMIT $3
            "#,
        )
        .bind(user_id)
        .bind(skip)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Query)
    }

    pub async fn upsert_weekly(
        &self,
        user_id: Uuid,
        week_start_date: NaiveDate,
        schedule_json: &Value,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO weekly_schedules (user_id, week_start_date, schedule_json, updated_at)
            VALUES ($1, $2, $3, now())
            ON CONFLICT (user_id, week_start_date) DO UPDATE SET
                schedule_json = EXCLUDED.schedule_json,
                updated_at = now()
            "#,
        )
        .bind(user_id)
        .bind(week_start_date)
        .bind(schedule_json)
        .execute(&self.pool)
        .await
        .map_err(StorageError::Query)?;
        Ok(())
    }

    pub async fn get_weekly(
        &self,
        user_id: Uuid,
        week_start_date: NaiveDate,
    ) -> Result<Option<WeeklyScheduleRow>, StorageError> {
        sqlx::query_as::<_, WeeklyScheduleRow>(
            r#"
            SELECT week_start_date, schedule_json, updated_at FROM weekly_schedules
            WHERE user_id = $1 AND week_start_date = $2
            "#,
        )
        .bind(user_id)
        .bind(week_start_date)
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::Query)
    }

    /// All weekly schedules, newest first, for the options listing.
    pub async fn list_weekly(&self, user_id: Uuid) -> Result<Vec<WeeklyScheduleRow>, StorageError> {
        sqlx::query_as::<_, WeeklyScheduleRow>(
            r#"
            SELECT week_start_date, schedule_json, updated_at FROM weekly_schedules
            WHERE user_id = $1
            ORDER BY week_start_date DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Query)
    }
}
