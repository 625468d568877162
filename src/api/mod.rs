//! REST API layer: route handlers, DTOs, OpenAPI document and router
//! composition.
//!
//! Resource endpoints are mounted under `/api/v1`; health, capability and
//! documentation routes live at the root.

pub mod dto;
pub mod handlers;
pub mod openapi;

use axum::Router;

use crate::app_state::AppState;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes())
        .merge(openapi::routes())
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Arc;

    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::config::InspectorConfig;
    use crate::domain::InspectorManager;
    use crate::kernel::testing::{FakeOpener, FakeSession};
    use crate::service::InspectorService;

    fn app(opener: Arc<FakeOpener>) -> Router {
        let manager = Arc::new(InspectorManager::new());
        let service = Arc::new(InspectorService::new(
            Arc::clone(&manager),
            opener,
            &InspectorConfig::default(),
        ));
        build_router().with_state(AppState { service, manager })
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let Ok(bytes) = to_bytes(response.into_body(), usize::MAX).await else {
            panic!("body should be readable");
        };
        let Ok(value) = serde_json::from_slice(&bytes) else {
            panic!("body should be JSON");
        };
        value
    }

    fn get(uri: &str) -> Request<Body> {
        let Ok(request) = Request::builder().uri(uri).body(Body::empty()) else {
            panic!("valid request");
        };
        request
    }

    fn post_json(uri: &str, body: &Value) -> Request<Body> {
        let Ok(request) = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
        else {
            panic!("valid request");
        };
        request
    }

    #[tokio::test]
    async fn health_reports_attached_sessions() {
        let Ok(response) = app(FakeOpener::with(&[])).oneshot(get("/health")).await else {
            panic!("router is infallible");
        };
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["attached_sessions"], 0);
    }

    #[tokio::test]
    async fn languages_lists_python_and_r() {
        let Ok(response) = app(FakeOpener::with(&[]))
            .oneshot(get("/config/languages"))
            .await
        else {
            panic!("router is infallible");
        };
        let body = json_body(response).await;
        let Some(languages) = body.as_array() else {
            panic!("array expected");
        };
        let names: Vec<&str> = languages
            .iter()
            .filter_map(|l| l["language"].as_str())
            .collect();
        assert!(names.contains(&"python3"));
        assert!(names.contains(&"R"));
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let Ok(response) = app(FakeOpener::with(&[]))
            .oneshot(get("/api/v1/sessions/ghost.ipynb"))
            .await
        else {
            panic!("router is infallible");
        };
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = json_body(response).await;
        assert!(body["error"]["message"].as_str().is_some());
    }

    #[tokio::test]
    async fn attach_then_fetch_by_encoded_path() {
        let fake = FakeSession::new("dir/old.ipynb", "cobol");
        let router = app(FakeOpener::with(&[&fake]));

        let Ok(response) = router
            .clone()
            .oneshot(post_json(
                "/api/v1/sessions",
                &serde_json::json!({ "path": "dir/old.ipynb" }),
            ))
            .await
        else {
            panic!("router is infallible");
        };
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = json_body(response).await;
        assert_eq!(body["path"], "dir/old.ipynb");
        assert_eq!(body["supported"], false);
        assert_eq!(body["selected"], true);

        let Ok(response) = router
            .oneshot(get("/api/v1/sessions/dir%2Fold.ipynb"))
            .await
        else {
            panic!("router is infallible");
        };
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["language"], "cobol");
    }

    #[tokio::test]
    async fn invalid_variable_name_is_rejected() {
        let fake = FakeSession::new("old.ipynb", "cobol");
        let router = app(FakeOpener::with(&[&fake]));
        let Ok(_) = router
            .clone()
            .oneshot(post_json(
                "/api/v1/sessions",
                &serde_json::json!({ "path": "old.ipynb" }),
            ))
            .await
        else {
            panic!("router is infallible");
        };

        let Ok(request) = Request::builder()
            .method("DELETE")
            .uri("/api/v1/sessions/old.ipynb/variables/x%3Bimport%20os")
            .body(Body::empty())
        else {
            panic!("valid request");
        };
        let Ok(response) = router.oneshot(request).await else {
            panic!("router is infallible");
        };
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
