//! Jupyter messaging protocol (v5) frames as carried by the Jupyter Server
//! kernel websocket.
//!
//! Only the fields the inspector consumes are typed; message content stays a
//! [`serde_json::Value`] and is read through the accessors on
//! [`KernelMessage`].

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version stamped on outgoing headers.
pub const PROTOCOL_VERSION: &str = "5.3";

/// Username stamped on outgoing headers.
const USERNAME: &str = "variable-inspector";

/// Kernel socket a frame travels on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Request/reply channel for execute and kernel-info requests.
    Shell,
    /// Broadcast channel for outputs and status.
    Iopub,
    /// Input requests from the kernel.
    Stdin,
    /// Interrupt/shutdown channel.
    Control,
}

/// Message header. Every field defaults so that the empty `{}` parent header
/// of unsolicited messages still decodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Unique message id; the correlation tag of a request.
    #[serde(default)]
    pub msg_id: String,
    /// Client session id.
    #[serde(default)]
    pub session: String,
    /// Originating user.
    #[serde(default)]
    pub username: String,
    /// ISO-8601 creation time.
    #[serde(default)]
    pub date: String,
    /// Message type, e.g. `execute_request` or `status`.
    #[serde(default)]
    pub msg_type: String,
    /// Protocol version.
    #[serde(default)]
    pub version: String,
}

impl Header {
    /// Builds a fresh header with a random v4 `msg_id`.
    #[must_use]
    pub fn new(msg_type: &str, session: &str) -> Self {
        Self {
            msg_id: uuid::Uuid::new_v4().to_string(),
            session: session.to_string(),
            username: USERNAME.to_string(),
            date: Utc::now().to_rfc3339(),
            msg_type: msg_type.to_string(),
            version: PROTOCOL_VERSION.to_string(),
        }
    }
}

/// A single protocol frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelMessage {
    /// Header of this message.
    pub header: Header,
    /// Header of the request this message answers, empty when unsolicited.
    #[serde(default)]
    pub parent_header: Header,
    /// Free-form metadata.
    #[serde(default)]
    pub metadata: Value,
    /// Type-specific content.
    #[serde(default)]
    pub content: Value,
    /// Channel the frame was received on (absent on some server versions).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<Channel>,
    /// Binary buffers, unused by the inspector.
    #[serde(default)]
    pub buffers: Vec<Value>,
}

impl KernelMessage {
    /// Builds an outgoing request frame.
    #[must_use]
    pub fn request(msg_type: &str, channel: Channel, session: &str, content: Value) -> Self {
        Self {
            header: Header::new(msg_type, session),
            parent_header: Header::default(),
            metadata: Value::Object(serde_json::Map::new()),
            content,
            channel: Some(channel),
            buffers: Vec::new(),
        }
    }

    /// Builds a frame answering `parent`. Used by in-process sessions.
    #[must_use]
    pub fn reply_to(parent: &str, msg_type: &str, channel: Channel, content: Value) -> Self {
        let parent_header = Header {
            msg_id: parent.to_string(),
            ..Header::default()
        };
        Self {
            header: Header::new(msg_type, ""),
            parent_header,
            metadata: Value::Object(serde_json::Map::new()),
            content,
            channel: Some(channel),
            buffers: Vec::new(),
        }
    }

    /// Message type of this frame.
    #[must_use]
    pub fn msg_type(&self) -> &str {
        &self.header.msg_type
    }

    /// `msg_id` of the request this frame belongs to, if any.
    #[must_use]
    pub fn parent_msg_id(&self) -> Option<&str> {
        let id = self.parent_header.msg_id.as_str();
        (!id.is_empty()).then_some(id)
    }

    /// Submitted source of an `execute_input` broadcast.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.content.get("code").and_then(Value::as_str)
    }

    /// `text/plain` representation of an `execute_result` or `display_data`.
    #[must_use]
    pub fn text_plain(&self) -> Option<&str> {
        self.content
            .get("data")
            .and_then(|data| data.get("text/plain"))
            .and_then(Value::as_str)
    }

    /// Kernel state carried by a `status` broadcast.
    #[must_use]
    pub fn execution_state(&self) -> Option<KernelStatus> {
        self.content
            .get("execution_state")
            .and_then(Value::as_str)
            .map(KernelStatus::from_state)
    }

    /// Whether this is a reply whose `status` is `error`.
    #[must_use]
    pub fn is_error_reply(&self) -> bool {
        self.content.get("status").and_then(Value::as_str) == Some("error")
    }

    /// `ename: evalue` summary of an `error` broadcast or error reply.
    #[must_use]
    pub fn error_summary(&self) -> String {
        let ename = self
            .content
            .get("ename")
            .and_then(Value::as_str)
            .unwrap_or("Error");
        let evalue = self
            .content
            .get("evalue")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if evalue.is_empty() {
            ename.to_string()
        } else {
            format!("{ename}: {evalue}")
        }
    }
}

/// Content of an `execute_request`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    /// Source to run.
    pub code: String,
    /// Suppress broadcast of `execute_input` and results.
    pub silent: bool,
    /// Record the request in the kernel's history.
    pub store_history: bool,
    /// Expressions to evaluate after execution, always empty here.
    pub user_expressions: serde_json::Map<String, Value>,
    /// Whether the kernel may prompt for input.
    pub allow_stdin: bool,
    /// Abort queued requests on error.
    pub stop_on_error: bool,
}

impl ExecuteRequest {
    /// A visible query: results are broadcast, history is not touched.
    #[must_use]
    pub fn query(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            silent: false,
            store_history: false,
            user_expressions: serde_json::Map::new(),
            allow_stdin: false,
            stop_on_error: false,
        }
    }

    /// A silent request, used for the init script and deletions.
    #[must_use]
    pub fn silent(code: impl Into<String>) -> Self {
        Self {
            silent: true,
            ..Self::query(code)
        }
    }
}

/// Kernel execution state as reported on `status` broadcasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KernelStatus {
    /// Kernel process is starting.
    Starting,
    /// Waiting for requests.
    Idle,
    /// Processing a request.
    Busy,
    /// Restart requested by a client.
    Restarting,
    /// Restart triggered by the server after the kernel died.
    Autorestarting,
    /// Kernel is gone.
    Dead,
    /// Any state this client does not know.
    Unknown,
}

impl KernelStatus {
    /// Parses a protocol `execution_state` string.
    #[must_use]
    pub fn from_state(state: &str) -> Self {
        match state {
            "starting" => Self::Starting,
            "idle" => Self::Idle,
            "busy" => Self::Busy,
            "restarting" => Self::Restarting,
            "autorestarting" => Self::Autorestarting,
            "dead" => Self::Dead,
            _ => Self::Unknown,
        }
    }

    /// `true` for the two transitions that invalidate kernel state.
    #[must_use]
    pub const fn is_restart(self) -> bool {
        matches!(self, Self::Restarting | Self::Autorestarting)
    }

    /// `true` when whatever was installed in the kernel is gone: a restart,
    /// or the kernel (or the connection to it) died.
    #[must_use]
    pub const fn is_reset(self) -> bool {
        self.is_restart() || matches!(self, Self::Dead)
    }
}

impl fmt::Display for KernelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Starting => "starting",
            Self::Idle => "idle",
            Self::Busy => "busy",
            Self::Restarting => "restarting",
            Self::Autorestarting => "autorestarting",
            Self::Dead => "dead",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Builders for the broadcast frames a kernel emits. In-process sessions use
/// them to answer requests.
pub mod frames {
    use serde_json::json;

    use super::{Channel, KernelMessage, KernelStatus};

    /// `execute_input` echo of submitted code.
    #[must_use]
    pub fn execute_input(parent: &str, code: &str) -> KernelMessage {
        KernelMessage::reply_to(
            parent,
            "execute_input",
            Channel::Iopub,
            json!({ "code": code, "execution_count": 1 }),
        )
    }

    /// `execute_result` carrying a `text/plain` representation.
    #[must_use]
    pub fn execute_result(parent: &str, text: &str) -> KernelMessage {
        KernelMessage::reply_to(
            parent,
            "execute_result",
            Channel::Iopub,
            json!({ "data": { "text/plain": text }, "metadata": {}, "execution_count": 1 }),
        )
    }

    /// `display_data` carrying a `text/plain` representation.
    #[must_use]
    pub fn display_data(parent: &str, text: &str) -> KernelMessage {
        KernelMessage::reply_to(
            parent,
            "display_data",
            Channel::Iopub,
            json!({ "data": { "text/plain": text }, "metadata": {}, "transient": {} }),
        )
    }

    /// `error` broadcast.
    #[must_use]
    pub fn error(parent: &str, ename: &str, evalue: &str) -> KernelMessage {
        KernelMessage::reply_to(
            parent,
            "error",
            Channel::Iopub,
            json!({ "ename": ename, "evalue": evalue, "traceback": [] }),
        )
    }

    /// `status` broadcast.
    #[must_use]
    pub fn status(parent: &str, status: KernelStatus) -> KernelMessage {
        KernelMessage::reply_to(
            parent,
            "status",
            Channel::Iopub,
            json!({ "execution_state": status.to_string() }),
        )
    }

    /// Successful `execute_reply`.
    #[must_use]
    pub fn execute_reply(parent: &str) -> KernelMessage {
        KernelMessage::reply_to(
            parent,
            "execute_reply",
            Channel::Shell,
            json!({ "status": "ok", "execution_count": 1, "user_expressions": {} }),
        )
    }

    /// Failed `execute_reply`.
    #[must_use]
    pub fn error_reply(parent: &str, ename: &str, evalue: &str) -> KernelMessage {
        KernelMessage::reply_to(
            parent,
            "execute_reply",
            Channel::Shell,
            json!({ "status": "error", "ename": ename, "evalue": evalue, "traceback": [] }),
        )
    }
}
