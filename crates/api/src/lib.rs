//! Cadence planning server library.

pub mod handlers;
pub mod middleware;
pub mod services;
pub mod ws;

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router,
    extract::State,
    routing::{get, patch, post},
};
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use cadence_config::AppConfig;
use cadence_domain::{HealthResponse, ReadyResponse};
use cadence_storage::{
    LogRepository, PushRepository, ScheduleRepository, SessionRepository, SuggestionRepository,
    TaskRepository, check_connection,
};
use sqlx::PgPool;

use handlers::notifications::{list_subscriptions, register_subscription, unregister_subscription};
use handlers::planning::{plan_weekly, weekly_schedule_options};
use handlers::reschedule::{
    accept_suggestion, decision_history, list_suggestions, reject_suggestion,
};
use handlers::scheduler::{get_daily, list_daily, plan_daily, save_daily};
use handlers::sessions::{
    checkout, current, history, pause, resume, snooze, start, update_kpt,
};
use services::delivery::{LiveChannels, PushDelivery};
use services::escalator::Escalator;
use services::pipeline::PlanCache;
use services::priority::PriorityOracle;
use services::reschedule::RescheduleEngine;
use services::sessions::SessionEngine;

/// Application state shared across handlers.
pub struct AppState {
    pub pool: PgPool,
    pub tasks: TaskRepository,
    pub logs: LogRepository,
    pub schedules: ScheduleRepository,
    pub sessions: SessionRepository,
    pub pushes: PushRepository,
    pub suggestions: SuggestionRepository,
    pub oracle: Option<Arc<dyn PriorityOracle>>,
    pub live_channels: Arc<LiveChannels>,
    pub push_delivery: PushDelivery,
    pub session_engine: SessionEngine,
    pub reschedule_engine: RescheduleEngine,
    pub plan_cache: PlanCache,
    pub config: AppConfig,
    pub start_time: Instant,
}

impl AppState {
    pub fn escalator(&self) -> Escalator {
        Escalator::new(
            self.sessions.clone(),
            self.live_channels.clone(),
            self.push_delivery.clone(),
        )
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/ready", get(ready))
        .route("/v1/planning/weekly", post(plan_weekly))
        .route("/v1/scheduler/daily", post(plan_daily))
        .route("/v1/scheduler/daily/list", get(list_daily))
        .route("/v1/scheduler/daily/{date}", get(get_daily).put(save_daily))
        .route(
            "/v1/scheduler/weekly-schedule-options",
            get(weekly_schedule_options),
        )
        .route("/v1/sessions/start", post(start))
        .route("/v1/sessions/current", get(current))
        .route("/v1/sessions/history", get(history))
        .route("/v1/sessions/pause", post(pause))
        .route("/v1/sessions/resume", post(resume))
        .route("/v1/sessions/snooze", post(snooze))
        .route("/v1/sessions/checkout", post(checkout))
        .route("/v1/sessions/{id}/kpt", patch(update_kpt))
        .route("/v1/notifications/ws", get(ws::ws_handler))
        .route(
            "/v1/notifications/subscriptions",
            post(register_subscription).get(list_subscriptions),
        )
        .route(
            "/v1/notifications/subscriptions/unregister",
            post(unregister_subscription),
        )
        .route("/v1/reschedule/suggestions", get(list_suggestions))
        .route(
            "/v1/reschedule/suggestions/{id}/accept",
            post(accept_suggestion),
        )
        .route(
            "/v1/reschedule/suggestions/{id}/reject",
            post(reject_suggestion),
        )
        .route("/v1/reschedule/decisions", get(decision_history))
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint.
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let uptime = state.start_time.elapsed().as_secs();

    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime,
    })
}

/// Readiness check endpoint.
async fn ready(State(state): State<Arc<AppState>>) -> Json<ReadyResponse> {
    let db_status = match check_connection(&state.pool).await {
        Ok(()) => "connected",
        Err(_) => "disconnected",
    };

    Json(ReadyResponse {
        status: if db_status == "connected" {
            "ok"
        } else {
            "degraded"
        }
        .to_string(),
        database: db_status.to_string(),
    })
}
