//! Variable handlers: matrix view, deletion, widget rendering.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};

use crate::api::dto::{AcceptedResponse, MatrixParams, RenderedOutputDto, WidgetResponse};
use crate::app_state::AppState;
use crate::error::{ErrorResponse, InspectorError};

/// `GET /sessions/{path}/variables/{name}/matrix`: tabular view of a
/// variable.
///
/// # Errors
///
/// Returns [`InspectorError::KernelError`] if the kernel raised,
/// [`InspectorError::MatrixUnsupported`] for unsupported languages, or
/// [`InspectorError::HandlerNotFound`] if the session is not attached.
#[utoipa::path(
    get,
    path = "/api/v1/sessions/{path}/variables/{name}/matrix",
    tag = "Variables",
    summary = "Fetch a variable as a table",
    description = "Runs the matrix query in the kernel and returns a grid model with `schema` and `data`.",
    params(
        ("path" = String, Path, description = "Percent-encoded session path"),
        ("name" = String, Path, description = "Variable name"),
        MatrixParams,
    ),
    responses(
        (status = 200, description = "Grid model", body = serde_json::Value),
        (status = 400, description = "Invalid variable name", body = ErrorResponse),
        (status = 404, description = "Session not attached", body = ErrorResponse),
        (status = 422, description = "Kernel error or unsupported language", body = ErrorResponse),
    )
)]
pub async fn get_matrix(
    State(state): State<AppState>,
    Path((path, name)): Path<(String, String)>,
    Query(params): Query<MatrixParams>,
) -> Result<impl IntoResponse, InspectorError> {
    let model = state
        .service
        .matrix(Some(&path), &name, params.max_rows)
        .await?;
    Ok(Json(model))
}

/// `DELETE /sessions/{path}/variables/{name}`: delete a variable in the
/// kernel.
///
/// # Errors
///
/// Returns [`InspectorError::HandlerNotFound`] if the session is not attached
/// or [`InspectorError::NoActiveKernel`] if its kernel is gone.
#[utoipa::path(
    delete,
    path = "/api/v1/sessions/{path}/variables/{name}",
    tag = "Variables",
    summary = "Delete a variable",
    description = "Deletes the variable silently; the panel receives a refreshed snapshot afterwards.",
    params(
        ("path" = String, Path, description = "Percent-encoded session path"),
        ("name" = String, Path, description = "Variable name"),
    ),
    responses(
        (status = 202, description = "Deletion done, refresh queued", body = AcceptedResponse),
        (status = 400, description = "Invalid variable name", body = ErrorResponse),
        (status = 404, description = "Session not attached", body = ErrorResponse),
    )
)]
pub async fn delete_variable(
    State(state): State<AppState>,
    Path((path, name)): Path<(String, String)>,
) -> Result<impl IntoResponse, InspectorError> {
    state.service.delete_variable(Some(&path), &name).await?;
    Ok((StatusCode::ACCEPTED, Json(AcceptedResponse::new())))
}

/// `POST /sessions/{path}/variables/{name}/widget`: render a widget.
///
/// # Errors
///
/// Returns [`InspectorError::HandlerNotFound`] if the session is not attached
/// or a session error if the request fails.
#[utoipa::path(
    post,
    path = "/api/v1/sessions/{path}/variables/{name}/widget",
    tag = "Variables",
    summary = "Render a widget variable",
    description = "Runs the widget query and returns the kernel's outputs once it has replied.",
    params(
        ("path" = String, Path, description = "Percent-encoded session path"),
        ("name" = String, Path, description = "Variable name"),
    ),
    responses(
        (status = 200, description = "Rendered outputs", body = WidgetResponse),
        (status = 400, description = "Invalid variable name", body = ErrorResponse),
        (status = 404, description = "Session not attached", body = ErrorResponse),
    )
)]
pub async fn render_widget(
    State(state): State<AppState>,
    Path((path, name)): Path<(String, String)>,
) -> Result<impl IntoResponse, InspectorError> {
    let outputs = state.service.render_widget(&path, &name).await?;
    Ok(Json(WidgetResponse {
        name,
        outputs: outputs.into_iter().map(RenderedOutputDto::from).collect(),
    }))
}

/// Variable routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sessions/{path}/variables/{name}", delete(delete_variable))
        .route("/sessions/{path}/variables/{name}/matrix", get(get_matrix))
        .route("/sessions/{path}/variables/{name}/widget", post(render_widget))
}
