//! Cadence planning server.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cadence_api::services::delivery::{
    LiveChannels, PushDelivery, PushTransport, WebPushTransport,
};
use cadence_api::services::pipeline::PlanCache;
use cadence_api::services::priority::{ChatOracle, PriorityOracle};
use cadence_api::services::reschedule::RescheduleEngine;
use cadence_api::services::sessions::SessionEngine;
use cadence_api::{AppState, build_router};
use cadence_config::AppConfig;
use cadence_storage::{
    LogRepository, PushRepository, ScheduleRepository, SessionRepository, SuggestionRepository,
    TaskRepository, create_pool, run_migrations,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Cadence planning server...");

    let config = AppConfig::from_env()?;
    tracing::info!("Binding to {}", config.bind_address);

    let pool = create_pool(&config.database_url).await?;
    tracing::info!("Database connection pool created");

    run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    let tasks = TaskRepository::new(pool.clone());
    let logs = LogRepository::new(pool.clone());
    let schedules = ScheduleRepository::new(pool.clone());
    let sessions = SessionRepository::new(pool.clone());
    let pushes = PushRepository::new(pool.clone());
    let suggestions = SuggestionRepository::new(pool.clone());

    let oracle: Option<Arc<dyn PriorityOracle>> = if config.oracle_base_url.is_empty() {
        tracing::info!("priority oracle not configured; using deterministic scoring");
        None
    } else {
        Some(Arc::new(ChatOracle::new(
            &config.oracle_base_url,
            &config.oracle_api_key,
            &config.oracle_model,
            Duration::from_secs(config.oracle_timeout_seconds),
        )))
    };

    let push_transport: Option<Arc<dyn PushTransport>> = if config.vapid_private_key.is_empty() {
        tracing::info!("web push not configured; notifications are live-channel only");
        None
    } else {
        Some(Arc::new(WebPushTransport::new(&config.vapid_subject)))
    };

    let live_channels = Arc::new(LiveChannels::new());
    let push_delivery = PushDelivery::new(pushes.clone(), push_transport);
    let session_engine = SessionEngine::new(sessions.clone(), tasks.clone(), logs.clone());
    let reschedule_engine =
        RescheduleEngine::new(schedules.clone(), suggestions.clone(), tasks.clone());

    let state = Arc::new(AppState {
        pool,
        tasks,
        logs,
        schedules,
        sessions,
        pushes,
        suggestions,
        oracle,
        live_channels,
        push_delivery,
        session_engine,
        reschedule_engine,
        plan_cache: PlanCache::new(),
        config: config.clone(),
        start_time: Instant::now(),
    });

    // Checkout escalator: one scan per tick over active sessions.
    let escalator = state.escalator();
    let escalator_interval = Duration::from_secs(config.escalator_interval_seconds.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(escalator_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            escalator.tick().await;
        }
    });

    // Suggestion expiry sweep.
    let sweeper = state.reschedule_engine.clone();
    let sweep_interval = Duration::from_secs(config.expiry_sweep_interval_seconds.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if let Err(e) = sweeper.expire_old().await {
                tracing::error!("suggestion expiry sweep failed: {}", e);
            }
        }
    });

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    tracing::info!("Server listening on {}", config.bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}
