//! Source handlers: which session the panel follows.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::{SelectSourceRequest, SourceResponse};
use crate::app_state::AppState;
use crate::domain::Inspectable;
use crate::error::{ErrorResponse, InspectorError};

/// `GET /source`: the current source.
///
/// # Errors
///
/// Infallible in practice; the signature matches the other handlers.
#[utoipa::path(
    get,
    path = "/api/v1/source",
    tag = "Source",
    summary = "Get the current source",
    responses(
        (status = 200, description = "Current source", body = SourceResponse),
    )
)]
pub async fn get_source(State(state): State<AppState>) -> Result<impl IntoResponse, InspectorError> {
    let path = state.manager.source().map(|s| s.id().to_string());
    Ok(Json(SourceResponse { path }))
}

/// `PUT /source`: follow another session.
///
/// # Errors
///
/// Returns [`InspectorError::HandlerNotFound`] if the session is not attached.
#[utoipa::path(
    put,
    path = "/api/v1/source",
    tag = "Source",
    summary = "Select the current source",
    description = "The connected panel switches to the session and receives a fresh snapshot.",
    request_body = SelectSourceRequest,
    responses(
        (status = 200, description = "Source selected", body = SourceResponse),
        (status = 404, description = "Session not attached", body = ErrorResponse),
        (status = 409, description = "Handler already disposed", body = ErrorResponse),
    )
)]
pub async fn select_source(
    State(state): State<AppState>,
    Json(req): Json<SelectSourceRequest>,
) -> Result<impl IntoResponse, InspectorError> {
    let selected = state.service.select(Some(&req.path)).await?;
    Ok(Json(SourceResponse {
        path: selected.map(|s| s.id().to_string()),
    }))
}

/// `DELETE /source`: stop following any session.
///
/// # Errors
///
/// Infallible in practice; the signature matches the other handlers.
#[utoipa::path(
    delete,
    path = "/api/v1/source",
    tag = "Source",
    summary = "Clear the current source",
    responses(
        (status = 204, description = "Source cleared"),
    )
)]
pub async fn clear_source(State(state): State<AppState>) -> Result<impl IntoResponse, InspectorError> {
    state.service.select(None).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Source routes.
pub fn routes() -> Router<AppState> {
    Router::new().route(
        "/source",
        get(get_source).put(select_source).delete(clear_source),
    )
}
