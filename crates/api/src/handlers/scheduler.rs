//! Daily schedule handlers: pack a day, persist and read plan blobs.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::NaiveDate;
use validator::Validate;

use crate::AppState;
use crate::middleware::auth::AuthUser;
use crate::services::daily_plan;
use cadence_domain::{
    DailyPlanDocument, DailyScheduleRequest, DailyScheduleResponse, DomainError,
    SaveDailyPlanRequest, ScheduleListQuery,
};

fn parse_date(raw: &str) -> Result<NaiveDate, DomainError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| DomainError::Validation("date must be YYYY-MM-DD".to_string()))
}

/// Pack one day's schedule.
pub async fn plan_daily(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(req): Json<DailyScheduleRequest>,
) -> Result<Json<DailyScheduleResponse>, DomainError> {
    req.validate().map_err(DomainError::from_validation_errors)?;

    let response = daily_plan::plan_daily(&state, user_id, &req).await?;
    Ok(Json(response))
}

/// Store the full plan blob for a date.
pub async fn save_daily(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(date): Path<String>,
    Json(req): Json<SaveDailyPlanRequest>,
) -> Result<Json<DailyPlanDocument>, DomainError> {
    let date = parse_date(&date)?;

    let row = state
        .schedules
        .upsert_daily(user_id, date, &req.plan)
        .await
        .map_err(|e| DomainError::Database(e.to_string()))?;

    tracing::info!(user_id = %user_id, date = %date, "daily plan saved");

    Ok(Json(DailyPlanDocument {
        date: row.date.format("%Y-%m-%d").to_string(),
        plan_json: row.plan_json,
        updated_at: row.updated_at,
    }))
}

/// Fetch the stored plan blob for a date.
pub async fn get_daily(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(date): Path<String>,
) -> Result<Json<DailyPlanDocument>, DomainError> {
    let date = parse_date(&date)?;

    let row = state
        .schedules
        .get_daily(user_id, date)
        .await
        .map_err(|e| DomainError::Database(e.to_string()))?
        .ok_or_else(|| DomainError::NotFound(format!("No schedule stored for {date}")))?;

    Ok(Json(DailyPlanDocument {
        date: row.date.format("%Y-%m-%d").to_string(),
        plan_json: row.plan_json,
        updated_at: row.updated_at,
    }))
}

/// List stored daily plans, newest first.
pub async fn list_daily(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Query(query): Query<ScheduleListQuery>,
) -> Result<Json<Vec<DailyPlanDocument>>, DomainError> {
    query.validate().map_err(DomainError::from_validation_errors)?;

    let rows = state
        .schedules
        .list_daily(user_id, query.skip.max(0), query.limit)
        .await
        .map_err(|e| DomainError::Database(e.to_string()))?;

    Ok(Json(
        rows.into_iter()
            .map(|row| DailyPlanDocument {
                date: row.date.format("%Y-%m-%d").to_string(),
                plan_json: row.plan_json,
                updated_at: row.updated_at,
            })
            .collect(),
    ))
}
