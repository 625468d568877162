//! Session handlers: attach, list, get, detach, inspect.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{AcceptedResponse, AttachRequest, SessionSummaryDto};
use crate::app_state::AppState;
use crate::domain::Inspectable;
use crate::error::{ErrorResponse, InspectorError};

/// `POST /sessions`: attach the inspector to a session.
///
/// # Errors
///
/// Returns [`InspectorError`] if the session cannot be opened.
#[utoipa::path(
    post,
    path = "/api/v1/sessions",
    tag = "Sessions",
    summary = "Attach to a session",
    description = "Opens the Jupyter session serving `path`, runs the inspection setup in its kernel and registers a handler. Attaching an already attached session returns the existing handler.",
    request_body = AttachRequest,
    responses(
        (status = 201, description = "Handler attached", body = SessionSummaryDto),
        (status = 400, description = "Empty path", body = ErrorResponse),
        (status = 404, description = "No such session on the Jupyter Server", body = ErrorResponse),
        (status = 503, description = "Session has no running kernel", body = ErrorResponse),
    )
)]
pub async fn attach_session(
    State(state): State<AppState>,
    Json(req): Json<AttachRequest>,
) -> Result<impl IntoResponse, InspectorError> {
    let handler = state.service.attach(&req.path).await?;
    let source = state.manager.source();
    let summary = SessionSummaryDto::from_handler(&handler, source.as_ref().map(|s| s.id()));
    Ok((StatusCode::CREATED, Json(summary)))
}

/// `GET /sessions`: list attached sessions.
///
/// # Errors
///
/// Infallible in practice; the signature matches the other handlers.
#[utoipa::path(
    get,
    path = "/api/v1/sessions",
    tag = "Sessions",
    summary = "List attached sessions",
    description = "Returns every session with a registered handler, ordered by path.",
    responses(
        (status = 200, description = "Attached sessions", body = Vec<SessionSummaryDto>),
    )
)]
pub async fn list_sessions(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, InspectorError> {
    let source = state.manager.source();
    let source_id = source.as_ref().map(|s| s.id());
    let data: Vec<SessionSummaryDto> = state
        .manager
        .handlers()
        .await
        .iter()
        .map(|handler| SessionSummaryDto::from_handler(handler, source_id))
        .collect();
    Ok(Json(data))
}

/// `GET /sessions/{path}`: get one attached session.
///
/// # Errors
///
/// Returns [`InspectorError::HandlerNotFound`] if the session is not attached.
#[utoipa::path(
    get,
    path = "/api/v1/sessions/{path}",
    tag = "Sessions",
    summary = "Get an attached session",
    params(
        ("path" = String, Path, description = "Percent-encoded session path"),
    ),
    responses(
        (status = 200, description = "Session summary", body = SessionSummaryDto),
        (status = 404, description = "Session not attached", body = ErrorResponse),
    )
)]
pub async fn get_session(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<impl IntoResponse, InspectorError> {
    let handler = state.manager.require_handler(&path).await?;
    let source = state.manager.source();
    Ok(Json(SessionSummaryDto::from_handler(
        &handler,
        source.as_ref().map(|s| s.id()),
    )))
}

/// `DELETE /sessions/{path}`: detach from a session.
///
/// # Errors
///
/// Returns [`InspectorError::HandlerNotFound`] if the session is not attached.
#[utoipa::path(
    delete,
    path = "/api/v1/sessions/{path}",
    tag = "Sessions",
    summary = "Detach from a session",
    description = "Disposes the session's handler. The kernel keeps running.",
    params(
        ("path" = String, Path, description = "Percent-encoded session path"),
    ),
    responses(
        (status = 204, description = "Handler disposed"),
        (status = 404, description = "Session not attached", body = ErrorResponse),
    )
)]
pub async fn detach_session(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<impl IntoResponse, InspectorError> {
    state.service.detach(&path).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /sessions/{path}/inspect`: request a fresh snapshot.
///
/// # Errors
///
/// Returns [`InspectorError::HandlerNotFound`] if the session is not attached.
#[utoipa::path(
    post,
    path = "/api/v1/sessions/{path}/inspect",
    tag = "Sessions",
    summary = "Refresh variables",
    description = "Queues an inspection. The snapshot is delivered to the connected panel over `/ws`.",
    params(
        ("path" = String, Path, description = "Percent-encoded session path"),
    ),
    responses(
        (status = 202, description = "Inspection queued", body = AcceptedResponse),
        (status = 404, description = "Session not attached", body = ErrorResponse),
    )
)]
pub async fn inspect_session(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<impl IntoResponse, InspectorError> {
    state.service.inspect(&path).await?;
    Ok((StatusCode::ACCEPTED, Json(AcceptedResponse::new())))
}

/// Session management routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sessions", post(attach_session).get(list_sessions))
        .route("/sessions/{path}", get(get_session).delete(detach_session))
        .route("/sessions/{path}/inspect", post(inspect_session))
}
