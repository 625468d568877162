//! System endpoints: health check, language catalog.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::app_state::AppState;
use crate::domain::{get_script, supported_languages};

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    status: String,
    timestamp: String,
    version: String,
    attached_sessions: usize,
}

/// `GET /health`: service health status.
#[utoipa::path(
    get,
    path = "/health",
    tag = "System",
    summary = "Health check",
    description = "Returns service health status, version, current timestamp and the number of attached sessions.",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
    )
)]
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            attached_sessions: state.manager.len().await,
        }),
    )
}

/// A kernel language with inspection support.
#[derive(Debug, Serialize, ToSchema)]
pub struct LanguageInfo {
    language: &'static str,
    query_command: &'static str,
    matrix_query_command: &'static str,
    widget_query_command: &'static str,
    delete_command: &'static str,
}

/// `GET /config/languages`: kernel languages the inspector understands.
#[utoipa::path(
    get,
    path = "/config/languages",
    tag = "System",
    summary = "List supported languages",
    description = "Kernels in any other language are attached with a handler that only reports the language as unsupported.",
    responses(
        (status = 200, description = "Language catalog", body = Vec<LanguageInfo>),
    )
)]
pub async fn languages_handler() -> impl IntoResponse {
    let languages: Vec<LanguageInfo> = supported_languages()
        .into_iter()
        .filter_map(|language| {
            let bundle = get_script(language).ok()?;
            Some(LanguageInfo {
                language,
                query_command: bundle.query_command,
                matrix_query_command: bundle.matrix_query_command,
                widget_query_command: bundle.widget_query_command,
                delete_command: bundle.delete_command,
            })
        })
        .collect();
    (StatusCode::OK, Json(languages))
}

/// System routes mounted at the root level (not under /api/v1).
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_handler))
        .route("/config/languages", get(languages_handler))
}
