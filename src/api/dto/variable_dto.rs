//! Variable DTOs for matrix and widget requests.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};

use crate::service::RenderedOutput;

/// Query parameters of the matrix endpoint.
#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct MatrixParams {
    /// Row limit. Defaults to the configured `MATRIX_MAX_ROWS`.
    #[serde(default)]
    pub max_rows: Option<usize>,
}

/// One output of a widget request.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RenderedOutputDto {
    /// Message type (`display_data`, `execute_result`, `stream`, `error`).
    pub output_type: String,
    /// Message content as sent by the kernel.
    pub content: Value,
}

impl From<RenderedOutput> for RenderedOutputDto {
    fn from(output: RenderedOutput) -> Self {
        Self {
            output_type: output.output_type,
            content: output.content,
        }
    }
}

/// Response body of the widget endpoint.
#[derive(Debug, Serialize, ToSchema)]
pub struct WidgetResponse {
    /// Variable that was rendered.
    pub name: String,
    /// Outputs in arrival order.
    pub outputs: Vec<RenderedOutputDto>,
}
