//! OpenAPI document for the REST surface.

use axum::Router;
use utoipa::OpenApi;

use super::dto::{
    AcceptedResponse, AttachRequest, RenderedOutputDto, SelectSourceRequest, SessionSummaryDto,
    SourceResponse, WidgetResponse,
};
use super::handlers::{sessions, source, system, variables};
use crate::app_state::AppState;
use crate::error::{ErrorBody, ErrorResponse};

/// Generated OpenAPI description of every REST endpoint.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "variable-inspector",
        description = "Live variable inspection for Jupyter kernels."
    ),
    paths(
        sessions::attach_session,
        sessions::list_sessions,
        sessions::get_session,
        sessions::detach_session,
        sessions::inspect_session,
        variables::get_matrix,
        variables::delete_variable,
        variables::render_widget,
        source::get_source,
        source::select_source,
        source::clear_source,
        system::health_handler,
        system::languages_handler,
    ),
    components(schemas(
        AttachRequest,
        SessionSummaryDto,
        SelectSourceRequest,
        SourceResponse,
        AcceptedResponse,
        RenderedOutputDto,
        WidgetResponse,
        ErrorResponse,
        ErrorBody,
        system::HealthResponse,
        system::LanguageInfo,
    )),
    tags(
        (name = "Sessions", description = "Attach to Jupyter sessions"),
        (name = "Variables", description = "Per-variable kernel queries"),
        (name = "Source", description = "Session followed by the panel"),
        (name = "System", description = "Health and capabilities"),
    )
)]
pub struct ApiDoc;

/// Serves the document at `/api-docs/openapi.json`, with Swagger UI at
/// `/swagger-ui` when the `swagger-ui` feature is enabled.
#[cfg(feature = "swagger-ui")]
pub fn routes() -> Router<AppState> {
    Router::new().merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", ApiDoc::openapi()),
    )
}

/// Serves the document at `/api-docs/openapi.json`.
#[cfg(not(feature = "swagger-ui"))]
pub fn routes() -> Router<AppState> {
    use axum::Json;
    use axum::routing::get;

    Router::new().route(
        "/api-docs/openapi.json",
        get(|| async { Json(ApiDoc::openapi()) }),
    )
}
