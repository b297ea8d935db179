//! Read-mostly access to projects, goals, tasks, dependencies and weekly
//! recurring tasks.

use std::collections::HashMap;

use sqlx::PgPool;
use uuid::Uuid;

use cadence_domain::{Goal, Project, Task, WeeklyRecurringTask};

use crate::StorageError;

#[derive(Clone)]
pub struct TaskRepository {
    pool: PgPool,
}

impl TaskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_task(
        &self,
        user_id: Uuid,
        task_id: Uuid,
    ) -> Result<Option<Task>, StorageError> {
        sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = $1 AND user_id = $2")
            .bind(task_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::Query)
    }

    pub async fn tasks_by_ids(
        &self,
        user_id: Uuid,
        task_ids: &[Uuid],
    ) -> Result<Vec<Task>, StorageError> {
        if task_ids.is_empty() {
            return Ok(Vec::new());
        }
        sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE user_id = $1 AND id = ANY($2)")
            .bind(user_id)
            .bind(task_ids)
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::Query)
    }

    /// Open (pending or in-progress) tasks, optionally limited to projects.
    pub async fn list_schedulable(
        &self,
        user_id: Uuid,
        project_filter: Option<&[Uuid]>,
    ) -> Result<Vec<Task>, StorageError> {
        match project_filter {
            Some(projects) => sqlx::query_as::<_, Task>(
                r#"
                SELECT t.* FROM tasks t
                JOIN goals g ON g.id = t.goal_id
                WHERE t.user_id = $1
                  AND t.status IN ('pending', 'in_progress')
                  AND g.project_id = ANY($2)
                ORDER BY t.created_at
                "#,
            )
            .bind(user_id)
            .bind(projects)
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::Query),
            None => sqlx::query_as::<_, Task>(
                r#"
                SELECT * FROM tasks
                WHERE user_id = $1 AND status IN ('pending', 'in_progress')
                ORDER BY created_at
                "#,
            )
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::Query),
        }
    }

    pub async fn list_projects(&self, user_id: Uuid) -> Result<Vec<Project>, StorageError> {
        sqlx::query_as::<_, Project>(
            "SELECT * FROM projects WHERE user_id = $1 ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Query)
    }

    pub async fn list_goals(&self, user_id: Uuid) -> Result<Vec<Goal>, StorageError> {
        sqlx::query_as::<_, Goal>("SELECT * FROM goals WHERE user_id = $1 ORDER BY created_at")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::Query)
    }

    /// Goal → project mapping for the user. A task's project is reached via
    /// its goal.
    pub async fn goal_project_map(
        &self,
        user_id: Uuid,
    ) -> Result<HashMap<Uuid, Uuid>, StorageError> {
        let rows = sqlx::query_as::<_, (Uuid, Uuid)>(
            "SELECT id, project_id FROM goals WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Query)?;
        Ok(rows.into_iter().collect())
    }

    /// All dependency edges whose dependent task is in `task_ids`, as
    /// `(task_id, depends_on_task_id)` pairs. One batch read.
    pub async fn task_dependencies(
        &self,
        task_ids: &[Uuid],
    ) -> Result<Vec<(Uuid, Uuid)>, StorageError> {
        if task_ids.is_empty() {
            return Ok(Vec::new());
        }
        sqlx::query_as::<_, (Uuid, Uuid)>(
            "SELECT task_id, depends_on_task_id FROM task_dependencies WHERE task_id = ANY($1)",
        )
        .bind(task_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Query)
    }

    /// All goal dependency edges whose dependent goal is in `goal_ids`.
    pub async fn goal_dependencies(
        &self,
        goal_ids: &[Uuid],
    ) -> Result<Vec<(Uuid, Uuid)>, StorageError> {
        if goal_ids.is_empty() {
            return Ok(Vec::new());
        }
        sqlx::query_as::<_, (Uuid, Uuid)>(
            "SELECT goal_id, depends_on_goal_id FROM goal_dependencies WHERE goal_id = ANY($1)",
        )
        .bind(goal_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Query)
    }

    /// Batch completion lookup: `id → is_completed` for every id found.
    pub async fn task_completion_map(
        &self,
        task_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, bool>, StorageError> {
        if task_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query_as::<_, (Uuid, String)>(
            "SELECT id, status FROM tasks WHERE id = ANY($1)",
        )
        .bind(task_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Query)?;
        Ok(rows
            .into_iter()
            .map(|(id, status)| (id, status == "completed"))
            .collect())
    }

    pub async fn goal_completion_map(
        &self,
        goal_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, bool>, StorageError> {
        if goal_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query_as::<_, (Uuid, String)>(
            "SELECT id, status FROM goals WHERE id = ANY($1)",
        )
        .bind(goal_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Query)?;
        Ok(rows
            .into_iter()
            .map(|(id, status)| (id, status == "completed"))
            .collect())
    }

    /// Active, non-deleted recurring tasks among `ids`.
    pub async fn recurring_by_ids(
        &self,
        user_id: Uuid,
        ids: &[Uuid],
    ) -> Result<Vec<WeeklyRecurringTask>, StorageError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        sqlx::query_as::<_, WeeklyRecurringTask>(
            r#"
            SELECT * FROM weekly_recurring_tasks
            WHERE user_id = $1 AND id = ANY($2) AND active AND deleted_at IS NULL
            ORDER BY created_at
            "#,
        )
        .bind(user_id)
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Query)
    }
}
