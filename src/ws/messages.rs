//! WebSocket message types: envelope, commands, and events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{InspectorUpdate, PanelEvent};

/// Top-level WebSocket message envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsMessage {
    /// Client-provided ID for requests; server-generated for events.
    pub id: String,
    /// Message type discriminator.
    #[serde(rename = "type")]
    pub msg_type: WsMessageType,
    /// ISO-8601 timestamp.
    pub timestamp: DateTime<Utc>,
    /// Variant-specific payload.
    pub payload: Value,
}

impl WsMessage {
    /// Server-originated message with a fresh id.
    #[must_use]
    pub fn server(msg_type: WsMessageType, payload: Value) -> Self {
        Self::reply(uuid::Uuid::new_v4().to_string(), msg_type, payload)
    }

    /// Message answering the client request `id`.
    #[must_use]
    pub fn reply(id: String, msg_type: WsMessageType, payload: Value) -> Self {
        Self {
            id,
            msg_type,
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Error message with a numeric code, mirroring the REST error body.
    #[must_use]
    pub fn error(id: String, code: u32, message: &str) -> Self {
        Self::reply(
            id,
            WsMessageType::Error,
            serde_json::json!({ "code": code, "message": message }),
        )
    }
}

/// Discriminator for WebSocket message types.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WsMessageType {
    /// Client → Server command.
    Command,
    /// Server → Client response to a command.
    Response,
    /// Server → Client panel event.
    Event,
    /// Server → Client error.
    Error,
}

/// Commands a panel can send, carried in the envelope's payload.
///
/// `path` defaults to the current source when omitted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum WsCommand {
    /// Ask a session for a fresh snapshot.
    Inspect {
        /// Target session.
        #[serde(default)]
        path: Option<String>,
    },
    /// Follow another session; `null` stops following.
    Select {
        /// Session to follow.
        #[serde(default)]
        path: Option<String>,
    },
    /// Fetch a variable as a table.
    Matrix {
        /// Target session.
        #[serde(default)]
        path: Option<String>,
        /// Variable name.
        name: String,
        /// Row limit; the configured default when omitted.
        #[serde(default)]
        max_rows: Option<usize>,
    },
    /// Delete a variable.
    Delete {
        /// Target session.
        #[serde(default)]
        path: Option<String>,
        /// Variable name.
        name: String,
    },
}

/// Event payloads pushed to the panel.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WsEvent {
    /// The followed session changed.
    SourceChanged {
        /// New source, `null` when none.
        path: Option<String>,
    },
    /// A snapshot of the followed session.
    Inspected {
        /// The snapshot.
        update: InspectorUpdate,
    },
}

impl From<PanelEvent> for WsEvent {
    fn from(event: PanelEvent) -> Self {
        match event {
            PanelEvent::SourceChanged(path) => Self::SourceChanged { path },
            PanelEvent::Inspected(update) => Self::Inspected { update },
        }
    }
}
