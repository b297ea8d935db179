//! Work-log access and the actual-hours aggregation.

use std::collections::HashMap;

use sqlx::PgPool;
use uuid::Uuid;

use crate::StorageError;

#[derive(Clone)]
pub struct LogRepository {
    pool: PgPool,
}

impl LogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Sum logged minutes per task and convert to hours. Every requested id
    /// that exists maps to a value (0 when it has no logs); unknown ids are
    /// skipped with a warning. Never fails: backend errors yield an empty
    /// map.
    pub async fn actual_hours(&self, task_ids: &[Uuid]) -> HashMap<Uuid, f64> {
        if task_ids.is_empty() {
            return HashMap::new();
        }

        let known: Vec<Uuid> = match sqlx::query_as::<_, (Uuid,)>(
            "SELECT id FROM tasks WHERE id = ANY($1)",
        )
        .bind(task_ids)
        .fetch_all(&self.pool)
        .await
        {
            Ok(rows) => rows.into_iter().map(|(id,)| id).collect(),
            Err(e) => {
                tracing::error!("actual-hours lookup failed: {}", e);
                return HashMap::new();
            }
        };

        for id in task_ids {
            if !known.contains(id) {
                tracing::warn!(task_id = %id, "skipping unknown task in actual-hours aggregation");
            }
        }

        let sums: Vec<(Uuid, i64)> = match sqlx::query_as::<_, (Uuid, i64)>(
            r#"
            SELECT task_id, COALESCE(SUM(actual_minutes), 0)
            FROM work_logs
            WHERE task_id = ANY($1)
            GROUP BY task_id
            "#,
        )
        .bind(&known)
        .fetch_all(&self.pool)
        .await
        {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!("actual-hours aggregation failed: {}", e);
                return HashMap::new();
            }
        };

        let mut hours: HashMap<Uuid, f64> = known.into_iter().map(|id| (id, 0.0)).collect();
        for (task_id, minutes) in sums {
            hours.insert(task_id, minutes as f64 / 60.0);
        }
        hours
    }

    /// Total minutes logged against one task.
    pub async fn total_minutes_for_task(&self, task_id: Uuid) -> Result<i64, StorageError> {
        let (total,): (i64,) = sqlx::query_as(
            "SELECT COALESCE(SUM(actual_minutes), 0) FROM work_logs WHERE task_id = $1",
        )
        .bind(task_id)
        .fetch_one(&self.pool)
        .await
        .map_err(StorageError::Query)?;
        Ok(total)
    }
}
