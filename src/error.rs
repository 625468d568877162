//! Inspector error types with HTTP status code mapping.
//!
//! [`InspectorError`] is the central error type for the service. Kernel
//! protocol failures are contained inside the handlers and surface only as
//! `Result` values; at the HTTP boundary each variant maps to a status code
//! and a structured JSON error response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2001,
///     "message": "no handler registered for session: work/analysis.ipynb",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code (see the table on [`InspectorError`]).
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Service-wide error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category          | HTTP Status                   |
/// |-----------|-------------------|-------------------------------|
/// | 1000–1999 | Validation        | 400 Bad Request               |
/// | 2000–2999 | State/Not Found   | 404 Not Found / 409 Conflict  |
/// | 3000–3999 | Server/Transport  | 500 / 502 / 503               |
/// | 4000–4999 | Kernel-Specific   | 422 Unprocessable Entity      |
#[derive(Debug, Clone, thiserror::Error)]
pub enum InspectorError {
    /// The session currently has no kernel attached. Retry after readiness.
    #[error("no active kernel attached to the session")]
    NoActiveKernel,

    /// No script bundle exists for the kernel language.
    #[error("language {0} not supported yet")]
    UnsupportedLanguage(String),

    /// Matrix inspection requested from the fallback handler.
    #[error("cannot inspect matrices for an unsupported language")]
    MatrixUnsupported,

    /// A kernel reply could not be decoded after unescaping.
    #[error("malformed kernel reply: {0}")]
    MalformedReply(String),

    /// The kernel reported an execution error.
    #[error("kernel error: {0}")]
    KernelError(String),

    /// No handler is registered for the given session identifier.
    #[error("no handler registered for session: {0}")]
    HandlerNotFound(String),

    /// The handler was disposed and can no longer be used.
    #[error("handler for session {0} has been disposed")]
    HandlerDisposed(String),

    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Host transport failure (HTTP or websocket).
    #[error("transport error: {0}")]
    Transport(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl InspectorError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::HandlerNotFound(_) => 2001,
            Self::HandlerDisposed(_) => 2002,
            Self::Internal(_) => 3000,
            Self::Transport(_) => 3001,
            Self::NoActiveKernel => 3002,
            Self::UnsupportedLanguage(_) => 4001,
            Self::MatrixUnsupported => 4002,
            Self::MalformedReply(_) => 4003,
            Self::KernelError(_) => 4004,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::HandlerNotFound(_) => StatusCode::NOT_FOUND,
            Self::HandlerDisposed(_) => StatusCode::CONFLICT,
            Self::UnsupportedLanguage(_)
            | Self::MatrixUnsupported
            | Self::MalformedReply(_)
            | Self::KernelError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NoActiveKernel => StatusCode::SERVICE_UNAVAILABLE,
            Self::Transport(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns `true` for failures that may succeed once the kernel is
    /// ready again.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::NoActiveKernel | Self::Transport(_))
    }
}

impl From<reqwest::Error> for InspectorError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for InspectorError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl IntoResponse for InspectorError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
