#![cfg(feature = "postgres-tests")]

mod support;

use chrono::{Duration, Utc};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use cadence_domain::{RescheduleTriggerType, SuggestionStatus};
use cadence_storage::{
    DecisionOutcome, NewSuggestion, ScheduleRepository, SessionRepository, SuggestionRepository,
};
use support::{seed_task, seed_user};

async fn seed_session(pool: &PgPool, user_id: Uuid, task_id: Uuid) -> Result<Uuid, sqlx::Error> {
    let repo = SessionRepository::new(pool.clone());
    let session = repo
        .start(user_id, task_id, Utc::now() + Duration::minutes(50), None)
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("start failed: {e}")))?;
    Ok(session.id)
}

fn suggestion(user_id: Uuid, session_id: Uuid, task_id: Uuid) -> NewSuggestion {
    NewSuggestion {
        user_id,
        work_session_id: session_id,
        trigger_type: RescheduleTriggerType::Checkout,
        trigger_decision: "complete".to_string(),
        original_plan: json!({ "assignments": [{ "task_id": task_id, "start_time": "09:00" }] }),
        proposed_plan: json!({ "assignments": [] }),
        diff: json!({ "total_changes": 1 }),
        expires_at: Utc::now() + Duration::hours(6),
    }
}

#[sqlx::test(migrations = "../../migrations")]
async fn accept_swaps_the_daily_plan_atomically(pool: PgPool) -> Result<(), sqlx::Error> {
    let user_id = seed_user(&pool).await?;
    let task_id = seed_task(&pool, user_id, "task").await?;
    let session_id = seed_session(&pool, user_id, task_id).await?;

    let schedules = ScheduleRepository::new(pool.clone());
    let today = Utc::now().date_naive();
    schedules
        .upsert_daily(
            user_id,
            today,
            &json!({ "assignments": [{ "task_id": task_id, "start_time": "09:00" }], "note": "keep" }),
        )
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("upsert failed: {e}")))?;

    let repo = SuggestionRepository::new(pool.clone());
    let created = repo
        .insert(&suggestion(user_id, session_id, task_id))
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("insert failed: {e}")))?;
    assert_eq!(created.status, SuggestionStatus::Pending);

    let outcome = repo
        .accept(user_id, created.id, Some("looks right"), today, Utc::now())
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("accept failed: {e}")))?;
    let DecisionOutcome::Decided(accepted) = outcome else {
        panic!("expected a decided outcome");
    };
    assert_eq!(accepted.status, SuggestionStatus::Accepted);
    assert!(accepted.decided_at.is_some());

    // Plan assignments replaced, other keys untouched.
    let row = schedules
        .get_daily(user_id, today)
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("get failed: {e}")))?
        .expect("schedule row");
    assert_eq!(row.plan_json["assignments"], json!([]));
    assert_eq!(row.plan_json["note"], json!("keep"));

    // The audit row exists.
    let decisions = repo
        .decision_history(user_id, 10)
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("history failed: {e}")))?;
    assert_eq!(decisions.len(), 1);
    assert!(decisions[0].accepted);
    assert_eq!(decisions[0].reason.as_deref(), Some("looks right"));

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn decided_suggestions_cannot_be_decided_again(pool: PgPool) -> Result<(), sqlx::Error> {
    let user_id = seed_user(&pool).await?;
    let task_id = seed_task(&pool, user_id, "task").await?;
    let session_id = seed_session(&pool, user_id, task_id).await?;

    let repo = SuggestionRepository::new(pool.clone());
    let created = repo
        .insert(&suggestion(user_id, session_id, task_id))
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("insert failed: {e}")))?;

    let rejected = repo
        .reject(user_id, created.id, None, Utc::now())
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("reject failed: {e}")))?;
    assert!(matches!(rejected, DecisionOutcome::Decided(_)));

    let again = repo
        .accept(user_id, created.id, None, Utc::now().date_naive(), Utc::now())
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("accept failed: {e}")))?;
    assert!(matches!(again, DecisionOutcome::NotPending(_)));

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn expiry_sweep_only_touches_stale_pending_rows(pool: PgPool) -> Result<(), sqlx::Error> {
    let user_id = seed_user(&pool).await?;
    let task_id = seed_task(&pool, user_id, "task").await?;
    let session_id = seed_session(&pool, user_id, task_id).await?;

    let repo = SuggestionRepository::new(pool.clone());

    let mut stale = suggestion(user_id, session_id, task_id);
    stale.expires_at = Utc::now() - Duration::hours(1);
    let stale = repo
        .insert(&stale)
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("insert failed: {e}")))?;
    let fresh = repo
        .insert(&suggestion(user_id, session_id, task_id))
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("insert failed: {e}")))?;

    let expired = repo
        .expire_old(Utc::now())
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("expire failed: {e}")))?;
    assert_eq!(expired, 1);

    let stale_now = repo
        .get(user_id, stale.id)
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("get failed: {e}")))?
        .expect("stale row");
    assert_eq!(stale_now.status, SuggestionStatus::Expired);
    assert!(stale_now.decided_at.is_some());

    let fresh_now = repo
        .get(user_id, fresh.id)
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("get failed: {e}")))?
        .expect("fresh row");
    assert_eq!(fresh_now.status, SuggestionStatus::Pending);

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn suggestions_are_scoped_to_their_owner(pool: PgPool) -> Result<(), sqlx::Error> {
    let user_id = seed_user(&pool).await?;
    let other_user = seed_user(&pool).await?;
    let task_id = seed_task(&pool, user_id, "task").await?;
    let session_id = seed_session(&pool, user_id, task_id).await?;

    let repo = SuggestionRepository::new(pool.clone());
    let created = repo
        .insert(&suggestion(user_id, session_id, task_id))
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("insert failed: {e}")))?;

    let outcome = repo
        .accept(other_user, created.id, None, Utc::now().date_naive(), Utc::now())
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("accept failed: {e}")))?;
    assert!(matches!(outcome, DecisionOutcome::NotFound));

    Ok(())
}
