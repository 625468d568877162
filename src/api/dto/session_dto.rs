//! Session DTOs for attach, list, and source selection.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{Inspectable, SharedHandler};

/// Request body for `POST /sessions`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct AttachRequest {
    /// Notebook or console path as known to the Jupyter Server.
    pub path: String,
}

/// One attached session.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionSummaryDto {
    /// Session path.
    pub path: String,
    /// Kernel display name.
    pub kernel_name: Option<String>,
    /// Kernel language.
    pub language: String,
    /// Whether the language has a script bundle.
    pub supported: bool,
    /// Whether this session is the panel's current source.
    pub selected: bool,
}

impl SessionSummaryDto {
    /// Builds the summary of `handler`; `source` is the current source id.
    #[must_use]
    pub fn from_handler(handler: &SharedHandler, source: Option<&str>) -> Self {
        Self {
            path: handler.id().to_string(),
            kernel_name: handler.kernel_name(),
            language: handler.language().to_string(),
            supported: handler.is_supported(),
            selected: source == Some(handler.id()),
        }
    }
}

/// Request body for `PUT /source`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SelectSourceRequest {
    /// Path of an attached session.
    pub path: String,
}

/// Response body of the source endpoints.
#[derive(Debug, Serialize, ToSchema)]
pub struct SourceResponse {
    /// Path of the current source, `null` when none is selected.
    pub path: Option<String>,
}

/// Body of `202 Accepted` responses.
#[derive(Debug, Serialize, ToSchema)]
pub struct AcceptedResponse {
    /// Always `"accepted"`.
    pub status: String,
}

impl AcceptedResponse {
    /// The accepted marker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            status: "accepted".to_string(),
        }
    }
}

impl Default for AcceptedResponse {
    fn default() -> Self {
        Self::new()
    }
}
