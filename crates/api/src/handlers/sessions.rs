//! Work-session handlers.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
};
use uuid::Uuid;
use validator::Validate;

use crate::AppState;
use crate::middleware::auth::AuthUser;
use cadence_domain::{
    CheckoutRequest, CheckoutResponse, DomainError, HistoryQuery, ResumeSessionRequest,
    SnoozeRequest, StartSessionRequest, UpdateKptRequest, WorkSession,
};

pub async fn start(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(req): Json<StartSessionRequest>,
) -> Result<Json<WorkSession>, DomainError> {
    req.validate().map_err(DomainError::from_validation_errors)?;
    let session = state.session_engine.start(user_id, &req).await?;
    Ok(Json(session))
}

pub async fn current(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Option<WorkSession>>, DomainError> {
    let session = state.session_engine.current(user_id).await?;
    Ok(Json(session))
}

pub async fn pause(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<WorkSession>, DomainError> {
    let session = state.session_engine.pause(user_id).await?;
    Ok(Json(session))
}

pub async fn resume(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(req): Json<ResumeSessionRequest>,
) -> Result<Json<WorkSession>, DomainError> {
    let session = state.session_engine.resume(user_id, &req).await?;
    Ok(Json(session))
}

pub async fn snooze(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(req): Json<SnoozeRequest>,
) -> Result<Json<WorkSession>, DomainError> {
    req.validate().map_err(DomainError::from_validation_errors)?;
    let session = state.session_engine.snooze(user_id, &req).await?;
    Ok(Json(session))
}

/// Checkout the active session. A checkout that displaces the rest of the
/// day's saved plan also yields a reschedule suggestion.
pub async fn checkout(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(req): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, DomainError> {
    req.validate().map_err(DomainError::from_validation_errors)?;

    let (session, log) = state.session_engine.checkout(user_id, &req).await?;

    // A failure to build the suggestion must not fail the checkout itself.
    let reschedule_suggestion = match state.reschedule_engine.maybe_suggest(&session).await {
        Ok(suggestion) => suggestion,
        Err(e) => {
            tracing::error!(session_id = %session.id, "reschedule suggestion failed: {}", e);
            None
        }
    };

    Ok(Json(CheckoutResponse {
        session,
        log,
        reschedule_suggestion,
    }))
}

pub async fn update_kpt(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(session_id): Path<Uuid>,
    Json(req): Json<UpdateKptRequest>,
) -> Result<Json<WorkSession>, DomainError> {
    req.validate().map_err(DomainError::from_validation_errors)?;
    let session = state
        .session_engine
        .update_kpt(user_id, session_id, &req)
        .await?;
    Ok(Json(session))
}

pub async fn history(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<WorkSession>>, DomainError> {
    query.validate().map_err(DomainError::from_validation_errors)?;
    let sessions = state
        .session_engine
        .history(user_id, query.skip.max(0), query.limit)
        .await?;
    Ok(Json(sessions))
}
