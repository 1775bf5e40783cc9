use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::Config;
use crate::fanout::FanoutHub;
use crate::middleware::{metrics_handler, metrics_middleware, require_auth};
use crate::routes::{alerts, devices, health, telemetry, ws};
use domain::services::alert_store::AlertStore;
use domain::services::pipeline::AlertPipeline;
use domain::services::registry::DeviceRegistry;
use shared::jwt::IdentityResolver;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub registry: Arc<dyn DeviceRegistry>,
    pub store: Arc<dyn AlertStore>,
    pub pipeline: Arc<AlertPipeline>,
    pub hub: Arc<FanoutHub>,
    pub identity: Arc<IdentityResolver>,
}

pub fn create_app(state: AppState) -> Router {
    let request_timeout = Duration::from_secs(state.config.server.request_timeout_secs);

    // Dashboards connect from arbitrary origins; auth is token-based.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // REST surface behind bearer auth.
    let protected_routes = Router::new()
        .route(
            "/api/v1/devices",
            put(devices::upsert_device).get(devices::list_devices),
        )
        .route(
            "/api/v1/devices/:id",
            get(devices::get_device).delete(devices::delete_device),
        )
        .route("/api/v1/telemetry", post(telemetry::ingest_reading))
        .route("/api/v1/alerts", get(alerts::list_alerts))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    // WebSocket streams resolve their token in the handler, before the
    // upgrade completes.
    let ws_routes = Router::new()
        .route("/ws/monitor", get(ws::monitor_stream))
        .route("/ws/alerts", get(ws::alert_stream));

    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/api/health", get(health::health_check))
        .route("/api/health/ready", get(health::ready))
        .route("/api/health/live", get(health::live))
        .route("/metrics", get(metrics_handler));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_routes)
        // Global middleware (order matters: bottom layers run first)
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
