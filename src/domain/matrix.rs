//! Tabular model returned by a matrix inspection.
//!
//! The kernel serialises tables in the pandas `orient="table"` shape: a
//! schema with column fields and optional primary key, plus one JSON object
//! per row. The model is handed to a grid renderer as-is.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::InspectorError;

/// One column of the table schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixField {
    /// Column name, also the key in each row object.
    pub name: String,
    /// Column type label (`integer`, `number`, `string`, …).
    #[serde(rename = "type", default)]
    pub field_type: String,
}

/// Column definitions of a [`MatrixModel`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatrixSchema {
    /// Columns in display order.
    pub fields: Vec<MatrixField>,
    /// Columns forming the row header.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub primary_key: Vec<String>,
}

/// Grid-displayable table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatrixModel {
    /// Column definitions.
    pub schema: MatrixSchema,
    /// Rows keyed by column name.
    #[serde(default)]
    pub data: Vec<Map<String, Value>>,
}

impl MatrixModel {
    /// Number of rows.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.data.len()
    }

    /// Number of columns, primary key included.
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.schema.fields.len()
    }

    /// Column names in display order.
    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.schema.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Cell at `row`, `column`; `None` when out of range or missing.
    #[must_use]
    pub fn cell(&self, row: usize, column: usize) -> Option<&Value> {
        let field = self.schema.fields.get(column)?;
        self.data.get(row)?.get(&field.name)
    }
}

/// Strips one leading and one trailing `'`, un-escapes `\"`, and re-escapes
/// `\'` as `\\'` so the quote survives JSON decoding.
#[must_use]
pub fn unwrap_matrix_reply(text: &str) -> String {
    let text = text.strip_prefix('\'').unwrap_or(text);
    let text = text.strip_suffix('\'').unwrap_or(text);
    text.replace("\\\"", "\"").replace("\\'", "\\\\'")
}

/// Decodes the reply to a matrix query.
///
/// # Errors
///
/// Returns [`InspectorError::MalformedReply`] if the unwrapped text is not a
/// table model.
pub fn parse_matrix_reply(text: &str) -> Result<MatrixModel, InspectorError> {
    let cleaned = unwrap_matrix_reply(text);
    serde_json::from_str(&cleaned).map_err(|e| InspectorError::MalformedReply(e.to_string()))
}
