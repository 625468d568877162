//! Canonical inspection updates and the decoding of query replies.
//!
//! The kernel answers the query command with the `text/plain` repr of a
//! JSON string. [`unwrap_text_reply`] peels one layer of quoting off that
//! repr before it is decoded. This recovers JSON from a display
//! representation and is lossy for payloads containing escaped backslashes;
//! it is kept as-is for compatibility with the shipped snippets.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::InspectorError;

/// Context label shown while a kernel restarts.
pub const RESTARTING_CONTEXT: &str = "Restarting kernel...";

/// Context label of the fallback handler.
pub const UNSUPPORTED_CONTEXT: &str = "Language currently not supported.";

/// One live variable, as described by the kernel. Every field is a display
/// string produced remotely and is passed through untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    /// Variable name.
    #[serde(deserialize_with = "display_string")]
    pub var_name: String,
    /// Type label.
    #[serde(default, deserialize_with = "display_string")]
    pub var_type: String,
    /// Size label.
    #[serde(default, deserialize_with = "display_string")]
    pub var_size: String,
    /// Shape label.
    #[serde(default, deserialize_with = "display_string")]
    pub var_shape: String,
    /// Truncated content preview.
    #[serde(default, deserialize_with = "display_string")]
    pub var_content: String,
    /// Whether a matrix inspection is available.
    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_matrix: bool,
    /// Whether the value can be rendered as a widget.
    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_widget: bool,
}

/// Accepts any JSON scalar as a display string; R emits sizes as numbers.
fn display_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    })
}

/// `null` counts as `false`; Python yields `None` when no widget library
/// is loaded.
fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::Array(items) => items.first().and_then(Value::as_bool).unwrap_or(false),
        _ => false,
    })
}

/// Header of an update. Synthesised locally, never part of the wire payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectorTitle {
    /// Context label (restart or unsupported-language notice).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_name: Option<String>,
    /// Kernel label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernel_name: Option<String>,
}

/// A full snapshot of a session's variables. Each update replaces the
/// previous one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectorUpdate {
    /// Header.
    pub title: InspectorTitle,
    /// Variables in kernel order.
    pub payload: Vec<Variable>,
}

impl InspectorUpdate {
    /// A regular snapshot.
    #[must_use]
    pub fn inspected(kernel_name: Option<String>, payload: Vec<Variable>) -> Self {
        Self {
            title: InspectorTitle {
                context_name: Some(String::new()),
                kernel_name: Some(kernel_name.unwrap_or_default()),
            },
            payload,
        }
    }

    /// Transient empty snapshot emitted when the kernel restarts.
    #[must_use]
    pub fn restarting() -> Self {
        Self {
            title: InspectorTitle {
                context_name: Some(RESTARTING_CONTEXT.to_string()),
                kernel_name: None,
            },
            payload: Vec::new(),
        }
    }

    /// Empty snapshot of the fallback handler.
    #[must_use]
    pub fn unsupported_language(kernel_name: Option<String>) -> Self {
        Self {
            title: InspectorTitle {
                context_name: Some(UNSUPPORTED_CONTEXT.to_string()),
                kernel_name: Some(kernel_name.unwrap_or_default()),
            },
            payload: Vec::new(),
        }
    }
}

/// Strips one layer of surrounding quotes from a `text/plain` repr and
/// un-escapes embedded quotes. Text not starting with a quote is returned
/// unchanged.
#[must_use]
pub fn unwrap_text_reply(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some('\'') | Some('"') => {
            chars.next_back();
            chars
                .as_str()
                .replace("\\\"", "\"")
                .replace("\\'", "'")
        }
        _ => text.to_string(),
    }
}

/// Decodes the reply to the query command.
///
/// # Errors
///
/// Returns [`InspectorError::MalformedReply`] if the unwrapped text is not a
/// JSON array of variables.
pub fn parse_inspection_reply(text: &str) -> Result<Vec<Variable>, InspectorError> {
    let cleaned = unwrap_text_reply(text);
    serde_json::from_str(&cleaned).map_err(|e| InspectorError::MalformedReply(e.to_string()))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    const WIRE: &str = r#"[{"varName":"x","varType":"int","varSize":"28","varShape":"","varContent":"5","isMatrix":false,"isWidget":false}]"#;

    #[test]
    fn quoted_payload_parses_exactly() {
        let quoted = format!("'{WIRE}'");
        let Ok(parsed) = parse_inspection_reply(&quoted) else {
            panic!("payload should parse");
        };
        let Ok(expected) = serde_json::from_str::<Vec<Variable>>(WIRE) else {
            panic!("wire should parse");
        };
        assert_eq!(parsed, expected);
        assert_eq!(
            parsed,
            vec![Variable {
                var_name: "x".into(),
                var_type: "int".into(),
                var_size: "28".into(),
                var_shape: String::new(),
                var_content: "5".into(),
                is_matrix: false,
                is_widget: false,
            }]
        );
    }

    #[test]
    fn unquoted_payload_is_left_alone() {
        assert_eq!(unwrap_text_reply(WIRE), WIRE);
        assert!(parse_inspection_reply(WIRE).is_ok());
    }

    #[test]
    fn escaped_quotes_are_restored() {
        let text = r#"'[{"varName":"s","varContent":"it\'s"}]'"#;
        let Ok(vars) = parse_inspection_reply(text) else {
            panic!("escaped quote payload should parse");
        };
        assert_eq!(vars.first().map(|v| v.var_content.as_str()), Some("it's"));
    }

    #[test]
    fn r_style_payload_is_tolerated() {
        let text = r#"[{"varType":"data.frame","varSize":0,"varShape":"3  x  2","varContent":"x","isMatrix":false,"varName":"df"}]"#;
        let Ok(vars) = parse_inspection_reply(text) else {
            panic!("R payload should parse");
        };
        let Some(df) = vars.first() else {
            panic!("one variable expected");
        };
        assert_eq!(df.var_size, "0");
        assert!(!df.is_widget);
    }

    #[test]
    fn null_widget_flag_is_false() {
        let text = r#"[{"varName":"n","isMatrix":true,"isWidget":null}]"#;
        let Ok(vars) = parse_inspection_reply(text) else {
            panic!("null flag should parse");
        };
        assert_eq!(vars.first().map(|v| (v.is_matrix, v.is_widget)), Some((true, false)));
    }

    #[test]
    fn malformed_reply_is_an_error() {
        let Err(err) = parse_inspection_reply("'<function f at 0x7f>'") else {
            panic!("garbage must not parse");
        };
        assert!(matches!(err, InspectorError::MalformedReply(_)));
    }

    #[test]
    fn titles_serialize_with_wire_names() {
        let Ok(json) = serde_json::to_value(InspectorUpdate::restarting()) else {
            panic!("update should serialize");
        };
        assert_eq!(json["title"]["contextName"], RESTARTING_CONTEXT);
        assert!(json["title"].get("kernelName").is_none());
        assert_eq!(json["payload"], serde_json::json!([]));
    }
}
