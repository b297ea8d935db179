//! Push subscription handlers.

use std::sync::Arc;

use axum::{Json, extract::State};
use validator::Validate;

use crate::AppState;
use crate::middleware::auth::AuthUser;
use cadence_domain::{
    DomainError, PushSubscription, RegisterPushRequest, UnregisterPushRequest,
};

/// Register (or revive) a push subscription for the caller.
pub async fn register_subscription(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(req): Json<RegisterPushRequest>,
) -> Result<Json<PushSubscription>, DomainError> {
    req.validate().map_err(DomainError::from_validation_errors)?;

    let subscription = state
        .pushes
        .register(
            user_id,
            &req.endpoint,
            &req.keys.p256dh,
            &req.keys.auth,
            req.user_agent.as_deref(),
            req.device_type.as_deref(),
        )
        .await
        .map_err(|e| DomainError::Database(e.to_string()))?;

    tracing::info!(user_id = %user_id, "push subscription registered");
    Ok(Json(subscription))
}

/// Deactivate a push subscription by endpoint.
pub async fn unregister_subscription(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(req): Json<UnregisterPushRequest>,
) -> Result<Json<serde_json::Value>, DomainError> {
    req.validate().map_err(DomainError::from_validation_errors)?;

    let removed = state
        .pushes
        .unregister(user_id, &req.endpoint)
        .await
        .map_err(|e| DomainError::Database(e.to_string()))?;
    if !removed {
        return Err(DomainError::NotFound(
            "Push subscription not found".to_string(),
        ));
    }

    tracing::info!(user_id = %user_id, "push subscription unregistered");
    Ok(Json(serde_json::json!({ "unregistered": true })))
}

/// List the caller's active push subscriptions.
pub async fn list_subscriptions(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<PushSubscription>>, DomainError> {
    let subscriptions = state
        .pushes
        .active_for_user(user_id)
        .await
        .map_err(|e| DomainError::Database(e.to_string()))?;
    Ok(Json(subscriptions))
}
