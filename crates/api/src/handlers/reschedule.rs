//! Reschedule suggestion handlers.

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
    DecideSuggestionRequest, DomainError, RescheduleDecision, RescheduleSuggestion,
    SuggestionQuery, SuggestionStatus,
};

/// List open suggestions. Only the PENDING filter is served; decided
/// suggestions are reachable through the decision history.
pub async fn list_suggestions(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Query(query): Query<SuggestionQuery>,
) -> Result<Json<Vec<RescheduleSuggestion>>, DomainError> {
    if let Some(status) = query.status {
        if status != SuggestionStatus::Pending {
            return Err(DomainError::Validation(
                "only status=PENDING is supported".to_string(),
            ));
        }
    }
    let suggestions = state.reschedule_engine.pending(user_id).await?;
    Ok(Json(suggestions))
}

pub async fn accept_suggestion(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(suggestion_id): Path<Uuid>,
    Json(req): Json<DecideSuggestionRequest>,
) -> Result<Json<RescheduleSuggestion>, DomainError> {
    req.validate().map_err(DomainError::from_validation_errors)?;

    let suggestion = state
        .reschedule_engine
        .accept(user_id, suggestion_id, req.reason.as_deref())
        .await?;

    tracing::info!(user_id = %user_id, suggestion_id = %suggestion_id, "reschedule suggestion accepted");
    Ok(Json(suggestion))
}

pub async fn reject_suggestion(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(suggestion_id): Path<Uuid>,
    Json(req): Json<DecideSuggestionRequest>,
) -> Result<Json<RescheduleSuggestion>, DomainError> {
    req.validate().map_err(DomainError::from_validation_errors)?;

    let suggestion = state
        .reschedule_engine
        .reject(user_id, suggestion_id, req.reason.as_deref())
        .await?;

    tracing::info!(user_id = %user_id, suggestion_id = %suggestion_id, "reschedule suggestion rejected");
    Ok(Json(suggestion))
}

/// Accept/reject audit trail, newest first.
pub async fn decision_history(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<RescheduleDecision>>, DomainError> {
    let decisions = state.reschedule_engine.decision_history(user_id, 50).await?;
    Ok(Json(decisions))
}
