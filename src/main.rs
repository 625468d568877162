//! variable-inspector server entry point.
//!
//! Starts the Axum HTTP server with REST and WebSocket endpoints, backed by
//! the Jupyter Server configured in `JUPYTER_URL`.

use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use variable_inspector::api;
use variable_inspector::app_state::AppState;
use variable_inspector::config::{InspectorConfig, LogFormat};
use variable_inspector::domain::InspectorManager;
use variable_inspector::kernel::JupyterServerClient;
use variable_inspector::service::InspectorService;
use variable_inspector::ws::handler::ws_handler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = InspectorConfig::from_env()
        .map_err(|err| anyhow::anyhow!("invalid configuration: {err}"))?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    tracing::info!(
        addr = %config.listen_addr,
        jupyter = %config.jupyter_url,
        "starting variable-inspector"
    );

    // Build kernel layer
    let opener = Arc::new(
        JupyterServerClient::new(&config).context("building Jupyter Server client")?,
    );

    // Build domain and service layers
    let manager = Arc::new(InspectorManager::new());
    let service = Arc::new(InspectorService::new(
        Arc::clone(&manager),
        opener,
        &config,
    ));

    // Build application state
    let app_state = AppState { service, manager };

    // Build router
    let app = Router::new()
        .merge(api::build_router())
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app).await?;

    Ok(())
}
