#![cfg(feature = "postgres-tests")]

mod support;

use sqlx::PgPool;
use uuid::Uuid;

use cadence_storage::{LogRepository, TaskRepository};
use support::{seed_task, seed_user};

async fn log_minutes(
    pool: &PgPool,
    user_id: Uuid,
    task_id: Uuid,
    minutes: i32,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO work_logs (task_id, user_id, actual_minutes) VALUES ($1, $2, $3)")
        .bind(task_id)
        .bind(user_id)
        .bind(minutes)
        .execute(pool)
        .await?;
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn actual_hours_sums_logs_and_zero_fills(pool: PgPool) -> Result<(), sqlx::Error> {
    let user_id = seed_user(&pool).await?;
    let logged = seed_task(&pool, user_id, "logged").await?;
    let unlogged = seed_task(&pool, user_id, "unlogged").await?;

    log_minutes(&pool, user_id, logged, 90).await?;
    log_minutes(&pool, user_id, logged, 30).await?;

    let repo = LogRepository::new(pool.clone());
    let hours = repo.actual_hours(&[logged, unlogged]).await;

    assert_eq!(hours.len(), 2);
    assert!((hours[&logged] - 2.0).abs() < 1e-9);
    assert_eq!(hours[&unlogged], 0.0);

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn actual_hours_skips_unknown_ids(pool: PgPool) -> Result<(), sqlx::Error> {
    let user_id = seed_user(&pool).await?;
    let known = seed_task(&pool, user_id, "known").await?;
    let unknown = Uuid::new_v4();

    let repo = LogRepository::new(pool.clone());
    let hours = repo.actual_hours(&[known, unknown]).await;

    assert_eq!(hours.len(), 1);
    assert!(hours.contains_key(&known));
    assert!(!hours.contains_key(&unknown));

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn completion_map_is_batch_resolved(pool: PgPool) -> Result<(), sqlx::Error> {
    let user_id = seed_user(&pool).await?;
    let done = seed_task(&pool, user_id, "done").await?;
    let open = seed_task(&pool, user_id, "open").await?;

    sqlx::query("UPDATE tasks SET status = 'completed' WHERE id = $1")
        .bind(done)
        .execute(&pool)
        .await?;

    let repo = TaskRepository::new(pool.clone());
    let map = repo
        .task_completion_map(&[done, open])
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("lookup failed: {e}")))?;

    assert_eq!(map[&done], true);
    assert_eq!(map[&open], false);

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn schedulable_listing_excludes_closed_tasks(pool: PgPool) -> Result<(), sqlx::Error> {
    let user_id = seed_user(&pool).await?;
    let open = seed_task(&pool, user_id, "open").await?;
    let cancelled = seed_task(&pool, user_id, "cancelled").await?;

    sqlx::query("UPDATE tasks SET status = 'cancelled' WHERE id = $1")
        .bind(cancelled)
        .execute(&pool)
        .await?;

    let repo = TaskRepository::new(pool.clone());
    let tasks = repo
        .list_schedulable(user_id, None)
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("list failed: {e}")))?;

    let ids: Vec<Uuid> = tasks.iter().map(|t| t.id).collect();
    assert!(ids.contains(&open));
    assert!(!ids.contains(&cancelled));

    Ok(())
}
