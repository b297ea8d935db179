#![cfg(feature = "postgres-tests")]

mod support;

use chrono::Utc;
use sqlx::PgPool;

use cadence_storage::PushRepository;
use support::seed_user;

#[sqlx::test(migrations = "../../migrations")]
async fn register_unregister_register_leaves_one_active(
    pool: PgPool,
) -> Result<(), sqlx::Error> {
    let user_id = seed_user(&pool).await?;
    let repo = PushRepository::new(pool.clone());
    let endpoint = "https://push.example.com/sub/abc";

    repo.register(user_id, endpoint, "p256dh-key", "auth-key", None, None)
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("register failed: {e}")))?;
    repo.unregister(user_id, endpoint)
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("unregister failed: {e}")))?;
    let revived = repo
        .register(user_id, endpoint, "p256dh-key-2", "auth-key-2", None, None)
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("re-register failed: {e}")))?;

    assert!(revived.active);
    assert_eq!(revived.failure_count, 0);
    assert_eq!(revived.p256dh_key, "p256dh-key-2");

    let active = repo
        .active_for_user(user_id)
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("list failed: {e}")))?;
    assert_eq!(active.len(), 1);

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn third_failure_deactivates_subscription(pool: PgPool) -> Result<(), sqlx::Error> {
    let user_id = seed_user(&pool).await?;
    let repo = PushRepository::new(pool.clone());

    let subscription = repo
        .register(user_id, "https://push.example.com/sub/x", "k", "a", None, None)
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("register failed: {e}")))?;

    for expected_failures in 1..=2 {
        let (failures, active) = repo
            .record_failure(subscription.id)
            .await
            .map_err(|e| sqlx::Error::Protocol(format!("failure failed: {e}")))?;
        assert_eq!(failures, expected_failures);
        assert!(active);
    }

    let (failures, active) = repo
        .record_failure(subscription.id)
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("failure failed: {e}")))?;
    assert_eq!(failures, 3);
    assert!(!active);

    let remaining = repo
        .active_for_user(user_id)
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("list failed: {e}")))?;
    assert!(remaining.is_empty());

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn success_resets_the_failure_count(pool: PgPool) -> Result<(), sqlx::Error> {
    let user_id = seed_user(&pool).await?;
    let repo = PushRepository::new(pool.clone());

    let subscription = repo
        .register(user_id, "https://push.example.com/sub/y", "k", "a", None, None)
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("register failed: {e}")))?;

    repo.record_failure(subscription.id)
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("failure failed: {e}")))?;
    repo.record_success(subscription.id, Utc::now())
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("success failed: {e}")))?;

    let active = repo
        .active_for_user(user_id)
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("list failed: {e}")))?;
    assert_eq!(active[0].failure_count, 0);
    assert!(active[0].last_success_at.is_some());

    Ok(())
}
