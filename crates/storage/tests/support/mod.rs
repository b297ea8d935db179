#![cfg(feature = "postgres-tests")]
#![allow(dead_code)]

use sqlx::PgPool;
use uuid::Uuid;

pub async fn seed_user(pool: &PgPool) -> Result<Uuid, sqlx::Error> {
    let user_id = Uuid::new_v4();
    sqlx::query("INSERT INTO users (id, email) VALUES ($1, $2)")
        .bind(user_id)
        .bind(format!("user-{user_id}@example.com"))
        .execute(pool)
        .await?;
    Ok(user_id)
}

pub async fn seed_task(pool: &PgPool, user_id: Uuid, title: &str) -> Result<Uuid, sqlx::Error> {
    let project_id = Uuid::new_v4();
    sqlx::query("INSERT INTO projects (id, user_id, title) VALUES ($1, $2, $3)")
        .bind(project_id)
        .bind(user_id)
        .bind("project")
        .execute(pool)
        .await?;

    let goal_id = Uuid::new_v4();
    sqlx::query("INSERT INTO goals (id, project_id, user_id, title) VALUES ($1, $2, $3, $4)")
        .bind(goal_id)
        .bind(project_id)
        .bind(user_id)
        .bind("goal")
        .execute(pool)
        .await?;

    let task_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO tasks (id, goal_id, user_id, title, estimate_hours) VALUES ($1, $2, $3, $4, 2.0)",
    )
    .bind(task_id)
    .bind(goal_id)
    .bind(user_id)
    .bind(title)
    .execute(pool)
    .await?;
    Ok(task_id)
}
