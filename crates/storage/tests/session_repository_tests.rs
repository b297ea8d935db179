#![cfg(feature = "postgres-tests")]

mod support;

use chrono::{Duration, Utc};
use sqlx::PgPool;

use cadence_domain::{CheckoutType, NotificationLevel, SessionDecision};
use cadence_storage::{SessionCheckout, SessionRepository, StorageError};
use support::{seed_task, seed_user};

#[sqlx::test(migrations = "../../migrations")]
async fn second_active_session_violates_unique_index(pool: PgPool) -> Result<(), sqlx::Error> {
    let user_id = seed_user(&pool).await?;
    let task_id = seed_task(&pool, user_id, "task").await?;

    let repo = SessionRepository::new(pool.clone());
    let deadline = Utc::now() + Duration::minutes(50);

    repo.start(user_id, task_id, deadline, None)
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("first start failed: {e}")))?;

    let second = repo.start(user_id, task_id, deadline, None).await;
    assert!(matches!(second, Err(StorageError::UniqueViolation(_))));

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn snooze_resets_notification_flags(pool: PgPool) -> Result<(), sqlx::Error> {
    let user_id = seed_user(&pool).await?;
    let task_id = seed_task(&pool, user_id, "task").await?;

    let repo = SessionRepository::new(pool.clone());
    let deadline = Utc::now() + Duration::minutes(3);
    let session = repo
        .start(user_id, task_id, deadline, None)
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("start failed: {e}")))?;

    repo.mark_level_sent(session.id, NotificationLevel::Light, Utc::now())
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("mark failed: {e}")))?;

    let snoozed = repo
        .apply_snooze(session.id, deadline + Duration::minutes(5), 1, Utc::now())
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("snooze failed: {e}")))?;

    assert_eq!(snoozed.snooze_count, 1);
    assert!(!snoozed.notification_5min_sent);
    assert!(!snoozed.notification_checkout_sent);
    assert!(!snoozed.notification_overdue_sent);

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn finish_checkout_writes_session_log_and_estimate(
    pool: PgPool,
) -> Result<(), sqlx::Error> {
    let user_id = seed_user(&pool).await?;
    let task_id = seed_task(&pool, user_id, "task").await?;

    let repo = SessionRepository::new(pool.clone());
    let session = repo
        .start(user_id, task_id, Utc::now() + Duration::minutes(50), None)
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("start failed: {e}")))?;

    let checkout = SessionCheckout {
        session_id: session.id,
        user_id,
        task_id,
        ended_at: Utc::now(),
        total_paused_seconds: 120,
        checkout_type: CheckoutType::Scheduled,
        decision: SessionDecision::Complete,
        continue_reason: None,
        kpt_keep: Some("stayed focused".to_string()),
        kpt_problem: None,
        kpt_try: None,
        remaining_estimate_hours: Some(1.0),
        actual_minutes: 45,
        kpt_summary: Some("K: stayed focused".to_string()),
        new_estimate_hours: Some(1.75),
    };

    let (ended, log) = repo
        .finish_checkout(&checkout)
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("checkout failed: {e}")))?;

    assert!(ended.ended_at.is_some());
    assert_eq!(ended.decision, Some(SessionDecision::Complete));
    assert_eq!(ended.total_paused_seconds, 120);
    assert_eq!(log.actual_minutes, 45);
    assert_eq!(log.comment.as_deref(), Some("K: stayed focused"));

    let (estimate,): (f64,) = sqlx::query_as("SELECT estimate_hours FROM tasks WHERE id = $1")
        .bind(task_id)
        .fetch_one(&pool)
        .await?;
    assert!((estimate - 1.75).abs() < 1e-9);

    // The user can start a fresh session now.
    assert!(repo
        .start(user_id, task_id, Utc::now() + Duration::minutes(30), None)
        .await
        .is_ok());

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn mark_unresponsive_is_idempotent(pool: PgPool) -> Result<(), sqlx::Error> {
    let user_id = seed_user(&pool).await?;
    let task_id = seed_task(&pool, user_id, "task").await?;

    let repo = SessionRepository::new(pool.clone());
    let session = repo
        .start(user_id, task_id, Utc::now() - Duration::minutes(11), None)
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("start failed: {e}")))?;

    let first = repo
        .mark_unresponsive(session.id, Utc::now())
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("mark failed: {e}")))?;
    let second = repo
        .mark_unresponsive(session.id, Utc::now())
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("mark failed: {e}")))?;

    assert!(first);
    assert!(!second);

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn active_scan_includes_task_titles(pool: PgPool) -> Result<(), sqlx::Error> {
    let user_id = seed_user(&pool).await?;
    let task_id = seed_task(&pool, user_id, "Write the report").await?;

    let repo = SessionRepository::new(pool.clone());
    repo.start(user_id, task_id, Utc::now() + Duration::minutes(50), None)
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("start failed: {e}")))?;

    let rows = repo
        .active_with_task_titles()
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("scan failed: {e}")))?;

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].task_title, "Write the report");
    assert!(rows[0].session.is_active());

    Ok(())
}
