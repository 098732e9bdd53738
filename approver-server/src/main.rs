use anyhow::{Context, Result};
use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;

use approver_server::config::Config;
use approver_server::status_waiter::{BackoffPolicy, StatusWaiterConfig, DEFAULT_WARM_UP};
use approver_server::webhook::webhook_router;
use approver_server::{AppState, ConfigStore, GitHubClient, LockRegistry, Orchestrator};

async fn health_check() -> Result<Json<serde_json::Value>, StatusCode> {
    Ok(Json(json!({
        "status": "healthy",
        "service": "approver"
    })))
}

async fn status_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let rules = state.orchestrator.config_store().current();
    Json(json!({
        "service": "approver",
        "version": approver_server::get_bot_version(),
        "rule_entries": rules.len(),
        "conditions": rules.condition_count(),
        "in_flight_attempts": state.orchestrator.locks().active_attempts(),
    }))
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration from environment")?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .init();

    info!(
        "Starting automated approver {}",
        approver_server::get_bot_version()
    );

    let config_store = Arc::new(
        ConfigStore::load(&config.rules_path)
            .with_context(|| format!("Failed to load rules from {}", config.rules_path.display()))?,
    );
    tokio::spawn(config_store.clone().watch(config.rules_poll_interval));

    let github_client = GitHubClient::with_api_url(config.github_auth, &config.github_api_url)?;

    let waiter_config = StatusWaiterConfig {
        warm_up: DEFAULT_WARM_UP,
        backoff: BackoffPolicy::with_max_elapsed(config.wait_for_statuses_timeout),
        merge_queue_context: config.merge_queue_context,
    };

    let orchestrator = Orchestrator::new(
        Arc::new(github_client),
        config_store,
        Arc::new(LockRegistry::new()),
        waiter_config,
        config.approved_label,
    );

    let app_state = Arc::new(AppState {
        orchestrator: Arc::new(orchestrator),
        webhook_secret: config.github_webhook_secret,
    });

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/status", get(status_handler))
        .merge(webhook_router(app_state.clone()))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(app_state);

    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    info!("Server listening on port {}", config.port);

    axum::serve(listener, app).await?;

    Ok(())
}
