//! Reschedule suggestion persistence and the atomic accept path.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use cadence_domain::{RescheduleDecision, RescheduleSuggestion, RescheduleTriggerType};

use crate::StorageError;

/// Fields for a freshly generated suggestion.
#[derive(Debug, Clone)]
pub struct NewSuggestion {
    pub user_id: Uuid,
    pub work_session_id: Uuid,
    pub trigger_type: RescheduleTriggerType,
    pub trigger_decision: String,
    pub original_plan: Value,
    pub proposed_plan: Value,
    pub diff: Value,
    pub expires_at: DateTime<Utc>,
}

/// Outcome of an accept/reject attempt.
#[derive(Debug)]
pub enum DecisionOutcome {
    Decided(RescheduleSuggestion),
    NotPending(RescheduleSuggestion),
    NotFound,
}

#[derive(Clone)]
pub struct SuggestionRepository {
    pool: PgPool,
}

impl SuggestionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(
        &self,
        suggestion: &NewSuggestion,
    ) -> Result<RescheduleSuggestion, StorageError> {
        sqlx::query_as::<_, RescheduleSuggestion>(
            r#"
            INSERT INTO reschedule_suggestions
                (user_id, work_session_id, trigger_type, trigger_decision,
                 original_plan, proposed_plan, diff, status, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'PENDING', $8)
            RETURNING *
            "#,
        )
        .bind(suggestion.user_id)
        .bind(suggestion.work_session_id)
        .bind(suggestion.trigger_type)
        .bind(&suggestion.trigger_decision)
        .bind(&suggestion.original_plan)
        .bind(&suggestion.proposed_plan)
        .bind(&suggestion.diff)
        .bind(suggestion.expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(StorageError::Query)
    }

    pub async fn get(
        &self,
        user_id: Uuid,
        suggestion_id: Uuid,
    ) -> Result<Option<RescheduleSuggestion>, StorageError> {
        sqlx::query_as::<_, RescheduleSuggestion>(
            "SELECT * FROM reschedule_suggestions WHERE id = $1 AND user_id = $2",
        )
        .bind(suggestion_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::Query)
    }

    pub async fn pending_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<RescheduleSuggestion>, StorageError> {
        sqlx::query_as::<_, RescheduleSuggestion>(
            r#"
            SELECT * FROM reschedule_suggestions
            WHERE user_id = $1 AND status = 'PENDING'
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Query)
    }

    /// Accept: flip the status, write the decision audit row and swap the
    /// day's plan assignments, all in one transaction.
    pub async fn accept(
        &self,
        user_id: Uuid,
        suggestion_id: Uuid,
        reason: Option<&str>,
        plan_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<DecisionOutcome, StorageError> {
        let mut tx = self.pool.begin().await.map_err(StorageError::Query)?;

        let Some(suggestion) = sqlx::query_as::<_, RescheduleSuggestion>(
            "SELECT * FROM reschedule_suggestions WHERE id = $1 AND user_id = $2 FOR UPDATE",
        )
        .bind(suggestion_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(StorageError::Query)?
        else {
            return Ok(DecisionOutcome::NotFound);
        };

        if suggestion.status.as_str() != "PENDING" {
            return Ok(DecisionOutcome::NotPending(suggestion));
        }

        let updated = sqlx::query_as::<_, RescheduleSuggestion>(
            r#"
            UPDATE reschedule_suggestions SET status = 'ACCEPTED', decided_at = $2
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(suggestion_id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(StorageError::Query)?;

        self.insert_decision_tx(&mut tx, &updated, true, reason)
            .await?;

        // Atomic plan swap: replace today's assignments with the proposal.
        if let Some(assignments) = updated.proposed_plan.get("assignments") {
            sqlx::query(
                r#"
                UPDATE schedules SET
                    plan_json = jsonb_set(plan_json, '{assignments}', $3, true),
                    updated_at = $4
                WHERE user_id = $1 AND date = $2
                "#,
            )
            .bind(user_id)
            .bind(plan_date)
            .bind(assignments)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(StorageError::Query)?;
        }

        tx.commit().await.map_err(StorageError::Query)?;
        Ok(DecisionOutcome::Decided(updated))
    }

    pub async fn reject(
        &self,
        user_id: Uuid,
        suggestion_id: Uuid,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<DecisionOutcome, StorageError> {
        let mut tx = self.pool.begin().await.map_err(StorageError::Query)?;

        let Some(suggestion) = sqlx::query_as::<_, RescheduleSuggestion>(
            "SELECT * FROM reschedule_suggestions WHERE id = $1 AND user_id = $2 FOR UPDATE",
        )
        .bind(suggestion_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(StorageError::Query)?
        else {
            return Ok(DecisionOutcome::NotFound);
        };

        if suggestion.status.as_str() != "PENDING" {
            return Ok(DecisionOutcome::NotPending(suggestion));
        }

        let updated = sqlx::query_as::<_, RescheduleSuggestion>(
            r#"
            UPDATE reschedule_suggestions SET status = 'REJECTED', decided_at = $2
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(suggestion_id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(StorageError::Query)?;

        self.insert_decision_tx(&mut tx, &updated, false, reason)
            .await?;

        tx.commit().await.map_err(StorageError::Query)?;
        Ok(DecisionOutcome::Decided(updated))
    }

    async fn insert_decision_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        suggestion: &RescheduleSuggestion,
        accepted: bool,
        reason: Option<&str>,
    ) -> Result<(), StorageError> {
        let context = serde_json::json!({
            "trigger_type": suggestion.trigger_type.as_str(),
            "trigger_decision": suggestion.trigger_decision,
        });
        sqlx::query(
            r#"
            INSERT INTO reschedule_decisions (suggestion_id, user_id, accepted, reason, context)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(suggestion.id)
        .bind(suggestion.user_id)
        .bind(accepted)
        .bind(reason)
        .bind(context)
        .execute(&mut **tx)
        .await
        .map_err(StorageError::Query)?;
        Ok(())
    }

    /// Expire every pending suggestion whose deadline passed. Returns the
    /// number of rows expired.
    pub async fn expire_old(&self, now: DateTime<Utc>) -> Result<u64, StorageError> {
        let result = sqlx::query(
            r#"
            UPDATE reschedule_suggestions SET status = 'EXPIRED', decided_at = $1
            WHERE status = 'PENDING' AND expires_at < $1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(StorageError::Query)?;
        Ok(result.rows_affected())
    }

    pub async fn decision_history(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<RescheduleDecision>, StorageError> {
        sqlx::query_as::<_, RescheduleDecision>(
            r#"
            SELECT * FROM reschedule_decisions
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Query)
    }
}
