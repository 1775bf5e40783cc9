use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use powermon_api::app::{create_app, AppState};
use powermon_api::config::Config;
use powermon_api::fanout::FanoutHub;
use powermon_api::jobs::{IdleSweepJob, JobScheduler};
use powermon_api::middleware::{init_logging, init_metrics};

use domain::services::alert_bus::AlertBus;
use domain::services::pipeline::{AlertPipeline, PipelineSettings};
use domain::services::registry::InMemoryRegistry;
use domain::services::status::StatusEngine;
use persistence::repositories::AlertRepository;
use shared::jwt::IdentityResolver;

/// Capacity of the in-process alert bus. Bounds how far the fan-out
/// listener may lag behind the pipeline before dropping alerts.
const ALERT_BUS_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (development convenience)
    dotenvy::dotenv().ok();

    let config = Arc::new(Config::load()?);

    init_logging(&config.logging);
    init_metrics()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting powermon API server"
    );

    // Database pool and schema
    let db_config = persistence::db::DatabaseConfig {
        url: config.database.url.clone(),
        max_connections: config.database.max_connections,
        min_connections: config.database.min_connections,
        connect_timeout_secs: config.database.connect_timeout_secs,
        idle_timeout_secs: config.database.idle_timeout_secs,
    };
    let pool = persistence::db::create_pool(&db_config).await?;
    sqlx::migrate!("../persistence/src/migrations")
        .run(&pool)
        .await?;
    info!("Database connected and migrated");

    // Token verification
    let identity = if !config.auth.public_key.is_empty() {
        IdentityResolver::from_rsa_pem(&config.auth.public_key, config.auth.leeway_secs)?
    } else {
        warn!("auth.public_key not set; falling back to HS256 secret (development only)");
        IdentityResolver::from_secret(&config.auth.hs256_secret)
    };
    let identity = Arc::new(identity);

    // Core engine wiring
    let registry = Arc::new(InMemoryRegistry::new());
    let store = Arc::new(AlertRepository::new(pool.clone()));
    let bus = AlertBus::new(ALERT_BUS_CAPACITY);
    let engine = StatusEngine::new(
        config.engine.liveness_signal,
        config.engine.liveness_threshold,
    );
    let pipeline = Arc::new(AlertPipeline::new(
        registry.clone(),
        store.clone(),
        bus.clone(),
        engine,
        PipelineSettings {
            utc_offset_minutes: config.engine.utc_offset_minutes,
            idle_timeout_secs: config.engine.idle_timeout_secs,
        },
    ));

    // WebSocket fan-out
    let hub = Arc::new(FanoutHub::new(
        registry.clone(),
        bus.clone(),
        Duration::from_secs(config.engine.broadcast_interval_secs),
    ));
    let fanout_tasks = hub.start();

    // Background jobs
    let mut scheduler = JobScheduler::new();
    scheduler.register(IdleSweepJob::new(
        pipeline.clone(),
        config.engine.sweep_interval_secs,
    ));
    scheduler.start();

    let state = AppState {
        pool,
        config: config.clone(),
        registry,
        store,
        pipeline,
        hub,
        identity,
    };

    let app = create_app(state);
    let addr = config.socket_addr()?;

    info!(address = %addr, "Server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped, shutting down background tasks");
    scheduler.shutdown();
    scheduler.wait_for_shutdown(Duration::from_secs(5)).await;
    fanout_tasks.stop().await;

    info!("Shutdown complete");
    Ok(())
}

/// Resolves when the process receives SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
