//! Weekly planning handlers.

use std::sync::Arc;

use axum::{Json, extract::State};
use validator::Validate;

use crate::AppState;
use crate::middleware::auth::AuthUser;
use crate::services::pipeline;
use cadence_domain::{
    DomainError, OptimizationRequest, OptimizationResponse, WeeklyScheduleOption,
};

/// Run the weekly optimization pipeline.
pub async fn plan_weekly(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(req): Json<OptimizationRequest>,
) -> Result<Json<OptimizationResponse>, DomainError> {
    req.validate().map_err(DomainError::from_validation_errors)?;

    tracing::info!(
        user_id = %user_id,
        week_start = %req.week_start_date,
        capacity = req.constraints.total_capacity_hours,
        slots = req.daily_time_slots.len(),
        use_ai_priority = req.use_ai_priority,
        "weekly planning requested"
    );

    let response = pipeline::execute(&state, user_id, &req).await;

    tracing::info!(
        user_id = %user_id,
        success = response.success,
        status = ?response.status,
        optimized_hours = response.total_optimized_hours,
        "weekly planning completed"
    );

    Ok(Json(response))
}

/// List stored weekly schedules, newest first.
pub async fn weekly_schedule_options(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<WeeklyScheduleOption>>, DomainError> {
    let rows = state
        .schedules
        .list_weekly(user_id)
        .await
        .map_err(|e| DomainError::Database(e.to_string()))?;

    let options = rows
        .into_iter()
        .map(|row| {
            let week_start_date = row.week_start_date.format("%Y-%m-%d").to_string();
            let task_count = row
                .schedule_json
                .get("selected_tasks")
                .and_then(|v| v.as_array())
                .map(|a| a.len())
                .unwrap_or(0);
            WeeklyScheduleOption {
                title: format!("Week of {week_start_date}"),
                week_start_date,
                task_count,
            }
        })
        .collect();

    Ok(Json(options))
}
