//! Work-session persistence.
//!
//! The session engine owns every mutation here; the escalator owns only the
//! notification flags and `marked_unresponsive_at`. The one-active-session
//! rule is backed by a partial unique index on `(user_id) WHERE ended_at IS
//! NULL`.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Row};
use uuid::Uuid;

use cadence_domain::{CheckoutType, NotificationLevel, SessionDecision, WorkLog, WorkSession};

use crate::StorageError;

/// Active session plus its task title, eager-loaded in one pass for the
/// escalator scan.
#[derive(Debug, Clone)]
pub struct ActiveSessionRow {
    pub session: WorkSession,
    pub task_title: String,
}

/// Everything `finish_checkout` writes in one transaction.
#[derive(Debug, Clone)]
pub struct SessionCheckout {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub task_id: Uuid,
    pub ended_at: DateTime<Utc>,
    pub total_paused_seconds: i64,
    pub checkout_type: CheckoutType,
    pub decision: SessionDecision,
    pub continue_reason: Option<String>,
    pub kpt_keep: Option<String>,
    pub kpt_problem: Option<String>,
    pub kpt_try: Option<String>,
    pub remaining_estimate_hours: Option<f64>,
    pub actual_minutes: i32,
    pub kpt_summary: Option<String>,
    /// New `task.estimate_hours`, already validated by the service.
    pub new_estimate_hours: Option<f64>,
}

#[derive(Clone)]
pub struct SessionRepository {
    pool: PgPool,
}

impl SessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn current(&self, user_id: Uuid) -> Result<Option<WorkSession>, StorageError> {
        sqlx::query_as::<_, WorkSession>(
            "SELECT * FROM work_sessions WHERE user_id = $1 AND ended_at IS NULL",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::Query)
    }

    pub async fn get(
        &self,
        user_id: Uuid,
        session_id: Uuid,
    ) -> Result<Option<WorkSession>, StorageError> {
        sqlx::query_as::<_, WorkSession>(
            "SELECT * FROM work_sessions WHERE id = $1 AND user_id = $2",
        )
        .bind(session_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::Query)
    }

    /// Insert a fresh session. A concurrent active session surfaces as
    /// `StorageError::UniqueViolation` via the partial unique index.
    pub async fn start(
        &self,
        user_id: Uuid,
        task_id: Uuid,
        planned_checkout_at: DateTime<Utc>,
        planned_outcome: Option<&str>,
    ) -> Result<WorkSession, StorageError> {
        sqlx::query_as::<_, WorkSession>(
            r#"
            INSERT INTO work_sessions (user_id, task_id, planned_checkout_at, planned_outcome)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(task_id)
        .bind(planned_checkout_at)
        .bind(planned_outcome)
        .fetch_one(&self.pool)
        .await
        .map_err(StorageError::from_query)
    }

    pub async fn set_paused(
        &self,
        session_id: Uuid,
        paused_at: DateTime<Utc>,
    ) -> Result<WorkSession, StorageError> {
        sqlx::query_as::<_, WorkSession>(
            "UPDATE work_sessions SET paused_at = $2, updated_at = $2 WHERE id = $1 RETURNING *",
        )
        .bind(session_id)
        .bind(paused_at)
        .fetch_one(&self.pool)
        .await
        .map_err(StorageError::Query)
    }

    pub async fn apply_resume(
        &self,
        session_id: Uuid,
        total_paused_seconds: i64,
        planned_checkout_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<WorkSession, StorageError> {
        sqlx::query_as::<_, WorkSession>(
            r#"
            UPDATE work_sessions SET
                paused_at = NULL,
                total_paused_seconds = $2,
                planned_checkout_at = $3,
                updated_at = $4
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(session_id)
        .bind(total_paused_seconds)
        .bind(planned_checkout_at)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(StorageError::Query)
    }

    /// Extend the deadline and clear the per-epoch notification flags so the
    /// escalation restarts against the new checkout time.
    pub async fn apply_snooze(
        &self,
        session_id: Uuid,
        planned_checkout_at: DateTime<Utc>,
        snooze_count: i16,
        now: DateTime<Utc>,
    ) -> Result<WorkSession, StorageError> {
        sqlx::query_as::<_, WorkSession>(
            r#"
            UPDATE work_sessions SET
                planned_checkout_at = $2,
                snooze_count = $3,
                last_snooze_at = $4,
                notification_5min_sent = FALSE,
                notification_checkout_sent = FALSE,
                notification_overdue_sent = FALSE,
                updated_at = $4
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(session_id)
        .bind(planned_checkout_at)
        .bind(snooze_count)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(StorageError::Query)
    }

    /// Terminal checkout: end the session, write the work log, and optionally
    /// adjust the task estimate, all in one transaction.
    pub async fn finish_checkout(
        &self,
        checkout: &SessionCheckout,
    ) -> Result<(WorkSession, WorkLog), StorageError> {
        let mut tx = self.pool.begin().await.map_err(StorageError::Query)?;

        let session = sqlx::query_as::<_, WorkSession>(
            r#"
            UPDATE work_sessions SET
                ended_at = $2,
                paused_at = NULL,
                total_paused_seconds = $3,
                checkout_type = $4,
                decision = $5,
                continue_reason = $6,
                kpt_keep = $7,
                kpt_problem = $8,
                kpt_try = $9,
                remaining_estimate_hours = $10,
                updated_at = $2
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(checkout.session_id)
        .bind(checkout.ended_at)
        .bind(checkout.total_paused_seconds)
        .bind(checkout.checkout_type)
        .bind(checkout.decision)
        .bind(checkout.continue_reason.as_deref())
        .bind(checkout.kpt_keep.as_deref())
        .bind(checkout.kpt_problem.as_deref())
        .bind(checkout.kpt_try.as_deref())
        .bind(checkout.remaining_estimate_hours)
        .fetch_one(&mut *tx)
        .await
        .map_err(StorageError::Query)?;

        let log = sqlx::query_as::<_, WorkLog>(
            r#"
            INSERT INTO work_logs (task_id, user_id, actual_minutes, comment)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(checkout.task_id)
        .bind(checkout.user_id)
        .bind(checkout.actual_minutes)
        .bind(checkout.kpt_summary.as_deref())
        .fetch_one(&mut *tx)
        .await
        .map_err(StorageError::Query)?;

        if let Some(new_estimate) = checkout.new_estimate_hours {
            sqlx::query("UPDATE tasks SET estimate_hours = $2, updated_at = $3 WHERE id = $1")
                .bind(checkout.task_id)
                .bind(new_estimate)
                .bind(checkout.ended_at)
                .execute(&mut *tx)
                .await
                .map_err(StorageError::Query)?;
        }

        tx.commit().await.map_err(StorageError::Query)?;
        Ok((session, log))
    }

    /// Overwrite the three KPT fields of a completed session.
    pub async fn update_kpt(
        &self,
        session_id: Uuid,
        kpt_keep: Option<&str>,
        kpt_problem: Option<&str>,
        kpt_try: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<WorkSession, StorageError> {
        sqlx::query_as::<_, WorkSession>(
            r#"
            UPDATE work_sessions SET
                kpt_keep = $2,
                kpt_problem = $3,
                kpt_try = $4,
                updated_at = $5
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(session_id)
        .bind(kpt_keep)
        .bind(kpt_problem)
        .bind(kpt_try)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(StorageError::Query)
    }

    pub async fn history(
        &self,
        user_id: Uuid,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<WorkSession>, StorageError> {
        sqlx::query_as::<_, WorkSession>(
            r#"
            SELECT * FROM work_sessions
            WHERE user_id = $1
            ORDER BY started_at DESC
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

    /// All active sessions with their task titles, one query. This is the
    /// escalator's per-tick scan.
    pub async fn active_with_task_titles(&self) -> Result<Vec<ActiveSessionRow>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT ws.*, t.title AS task_title
            FROM work_sessions ws
            JOIN tasks t ON t.id = ws.task_id
            WHERE ws.ended_at IS NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Query)?;

        rows.into_iter()
            .map(|row| {
                let session = WorkSession::from_row(&row).map_err(StorageError::Query)?;
                let task_title: String = row.try_get("task_title").map_err(StorageError::Query)?;
                Ok(ActiveSessionRow {
                    session,
                    task_title,
                })
            })
            .collect()
    }

    /// Flip one per-level delivery flag to true. Flags are delivery intent,
    /// committed before the send.
    pub async fn mark_level_sent(
        &self,
        session_id: Uuid,
        level: NotificationLevel,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let sql = match level {
            NotificationLevel::Light => {
                "UPDATE work_sessions SET notification_5min_sent = TRUE, updated_at = $2 WHERE id = $1"
            }
            NotificationLevel::Strong => {
                "UPDATE work_sessions SET notification_checkout_sent = TRUE, updated_at = $2 WHERE id = $1"
            }
            NotificationLevel::Overdue => {
                "UPDATE work_sessions SET notification_overdue_sent = TRUE, updated_at = $2 WHERE id = $1"
            }
        };
        sqlx::query(sql)
            .bind(session_id)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(StorageError::Query)?;
        Ok(())
    }

    /// Set `marked_unresponsive_at` once. Idempotent: returns whether this
    /// call did the marking.
    pub async fn mark_unresponsive(
        &self,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query(
            r#"
            UPDATE work_sessions SET marked_unresponsive_at = $2, updated_at = $2
            WHERE id = $1 AND ended_at IS NULL AND marked_unresponsive_at IS NULL
            "#,
        )
        .bind(session_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(StorageError::Query)?;
        Ok(result.rows_affected() > 0)
    }
}
