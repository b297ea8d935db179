//! Push subscription persistence with failure-count deactivation.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use cadence_domain::PushSubscription;

use crate::StorageError;

/// Consecutive delivery failures that deactivate a subscription.
pub const MAX_PUSH_FAILURES: i32 = 3;

#[derive(Clone)]
pub struct PushRepository {
    pool: PgPool,
}

impl PushRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Register or update by `(user, endpoint)`. Updating revives an
    /// inactive subscription and zeroes its failure count.
    pub async fn register(
        &self,
        user_id: Uuid,
        endpoint: &str,
        p256dh_key: &str,
        auth_key: &str,
        user_agent: Option<&str>,
        device_type: Option<&str>,
    ) -> Result<PushSubscription, StorageError> {
        sqlx::query_as::<_, PushSubscription>(
            r#"
            INSERT INTO push_subscriptions
                (user_id, endpoint, p256dh_key, auth_key, user_agent, device_type)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id, endpoint) DO UPDATE SET
                p256dh_key = EXCLUDED.p256dh_key,
                auth_key = EXCLUDED.auth_key,
                user_agent = EXCLUDED.user_agent,
                device_type = EXCLUDED.device_type,
                active = TRUE,
                failure_count = 0,
                updated_at = now()
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(endpoint)
        .bind(p256dh_key)
        .bind(auth_key)
        .bind(user_agent)
        .bind(device_type)
        .fetch_one(&self.pool)
        .await
        .map_err(StorageError::Query)
    }

    /// Deactivate by `(user, endpoint)`. Returns whether a row was affected.
    pub async fn unregister(&self, user_id: Uuid, endpoint: &str) -> Result<bool, StorageError> {
        let result = sqlx::query(
            r#"
            UPDATE push_subscriptions SET active = FALSE, updated_at = now()
            WHERE user_id = $1 AND endpoint = $2
            "#,
        )
        .bind(user_id)
        .bind(endpoint)
        .execute(&self.pool)
        .await
        .map_err(StorageError::Query)?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn active_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<PushSubscription>, StorageError> {
        sqlx::query_as::<_, PushSubscription>(
            "SELECT * FROM push_subscriptions WHERE user_id = $1 AND active ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Query)
    }

    pub async fn record_success(
        &self,
        subscription_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            UPDATE push_subscriptions SET
                last_success_at = $2,
                failure_count = 0,
                updated_at = $2
            WHERE id = $1
            "#,
        )
        .bind(subscription_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(StorageError::Query)?;
        Ok(())
    }

    /// Increment the failure count, deactivating at the threshold. Returns
    /// `(failure_count, active)` after the update.
    pub async fn record_failure(
        &self,
        subscription_id: Uuid,
    ) -> Result<(i32, bool), StorageError> {
        sqlx::query_as::<_, (i32, bool)>(
            r#"
            UPDATE push_subscriptions SET
                failure_count = failure_count + 1,
                active = (failure_count + 1 < $2),
                updated_at = now()
            WHERE id = $1
            RETURNING failure_count, active
            "#,
        )
        .bind(subscription_id)
        .bind(MAX_PUSH_FAILURES)
        .fetch_one(&self.pool)
        .await
        .map_err(StorageError::Query)
    }
}
