//! WebSocket connection state machine.
//!
//! Each connection is one inspector panel. It registers an
//! [`InspectorPanel`] with the manager (replacing any earlier panel),
//! forwards the panel's events, and dispatches panel commands to the
//! [`InspectorService`].

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;

use super::messages::{WsCommand, WsEvent, WsMessage, WsMessageType};
use crate::domain::{Inspectable, InspectorPanel};
use crate::error::InspectorError;
use crate::service::InspectorService;

/// Buffered panel events per connection.
const PANEL_EVENT_BUFFER: usize = 64;

/// Runs the read/write loop for a single WebSocket connection.
///
/// - Reads commands from the client and dispatches them.
/// - Forwards [`crate::domain::PanelEvent`]s to the client.
///
/// The loop ends when the client closes, or when a newer connection takes
/// over the panel.
pub async fn run_connection(socket: WebSocket, service: Arc<InspectorService>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (event_tx, mut event_rx) = mpsc::channel(PANEL_EVENT_BUFFER);

    let manager = Arc::clone(service.manager());
    let panel = InspectorPanel::spawn(&manager, event_tx);
    if let Some(previous) = manager.set_panel(Arc::clone(&panel)).await {
        tracing::info!(previous = %previous.id(), panel = %panel.id(), "panel replaced");
        previous.dispose();
    }
    tracing::debug!(panel = %panel.id(), "ws panel connected");

    loop {
        tokio::select! {
            // Incoming message from client
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let response = handle_text_message(&text, &service).await;
                        if let Some(resp_json) = response
                            && ws_tx.send(Message::text(resp_json)).await.is_err() {
                                break;
                            }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => {}
                }
            }
            // Event from the panel
            event = event_rx.recv() => {
                let Some(event) = event else {
                    tracing::debug!(panel = %panel.id(), "panel closed by a newer connection");
                    break;
                };
                let payload = serde_json::to_value(WsEvent::from(event)).unwrap_or_default();
                let msg = WsMessage::server(WsMessageType::Event, payload);
                let json = serde_json::to_string(&msg).unwrap_or_default();
                if ws_tx.send(Message::text(json)).await.is_err() {
                    break;
                }
            }
        }
    }

    manager.clear_panel(panel.id()).await;
    panel.dispose();
    tracing::debug!(panel = %panel.id(), "ws connection closed");
}

/// Handles a text message from the client, returning an optional JSON response.
async fn handle_text_message(text: &str, service: &InspectorService) -> Option<String> {
    let Ok(msg) = serde_json::from_str::<WsMessage>(text) else {
        let err = WsMessage::error(String::new(), 400, "malformed JSON");
        return serde_json::to_string(&err).ok();
    };

    let Ok(command) = serde_json::from_value::<WsCommand>(msg.payload) else {
        let err = WsMessage::error(msg.id, 404, "unknown command");
        return serde_json::to_string(&err).ok();
    };

    let response = match execute_command(command, service).await {
        Ok(payload) => WsMessage::reply(msg.id, WsMessageType::Response, payload),
        Err(err) => {
            tracing::debug!(error = %err, "ws command failed");
            WsMessage::error(msg.id, err.error_code(), &err.to_string())
        }
    };
    serde_json::to_string(&response).ok()
}

async fn execute_command(
    command: WsCommand,
    service: &InspectorService,
) -> Result<Value, InspectorError> {
    match command {
        WsCommand::Inspect { path } => {
            let handler = service.resolve(path.as_deref()).await?;
            handler.perform_inspection();
            Ok(serde_json::json!({ "inspecting": handler.id() }))
        }
        WsCommand::Select { path } => {
            let selected = service.select(path.as_deref()).await?;
            Ok(serde_json::json!({ "source": selected.as_ref().map(|s| s.id()) }))
        }
        WsCommand::Matrix {
            path,
            name,
            max_rows,
        } => {
            let model = service.matrix(path.as_deref(), &name, max_rows).await?;
            Ok(serde_json::json!({ "name": name, "matrix": model }))
        }
        WsCommand::Delete { path, name } => {
            service.delete_variable(path.as_deref(), &name).await?;
            Ok(serde_json::json!({ "deleted": name }))
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::config::InspectorConfig;
    use crate::domain::InspectorManager;
    use crate::kernel::testing::{FakeOpener, FakeSession};

    fn service(opener: Arc<FakeOpener>) -> InspectorService {
        InspectorService::new(
            Arc::new(InspectorManager::new()),
            opener,
            &InspectorConfig::default(),
        )
    }

    fn parse(json: Option<String>) -> Value {
        let Some(json) = json else {
            panic!("a response is expected");
        };
        let Ok(value) = serde_json::from_str(&json) else {
            panic!("response should be JSON");
        };
        value
    }

    fn command(payload: Value) -> String {
        serde_json::json!({
            "id": "req-1",
            "type": "command",
            "timestamp": "2026-01-01T00:00:00Z",
            "payload": payload,
        })
        .to_string()
    }

    #[tokio::test]
    async fn malformed_json_is_reported() {
        let service = service(FakeOpener::with(&[]));
        let value = parse(handle_text_message("{not json", &service).await);
        assert_eq!(value["type"], "error");
        assert_eq!(value["payload"]["code"], 400);
    }

    #[tokio::test]
    async fn unknown_command_is_reported() {
        let service = service(FakeOpener::with(&[]));
        let text = command(serde_json::json!({ "command": "subscribe" }));
        let value = parse(handle_text_message(&text, &service).await);
        assert_eq!(value["id"], "req-1");
        assert_eq!(value["payload"]["code"], 404);
    }

    #[tokio::test]
    async fn inspect_without_source_fails() {
        let service = service(FakeOpener::with(&[]));
        let text = command(serde_json::json!({ "command": "inspect" }));
        let value = parse(handle_text_message(&text, &service).await);
        assert_eq!(value["type"], "error");
    }

    #[tokio::test]
    async fn select_and_matrix_on_fallback() {
        let fake = FakeSession::new("old.ipynb", "cobol");
        let service = service(FakeOpener::with(&[&fake]));
        let Ok(_) = service.attach("old.ipynb").await else {
            panic!("attach should succeed");
        };

        let text = command(serde_json::json!({ "command": "select", "path": "old.ipynb" }));
        let value = parse(handle_text_message(&text, &service).await);
        assert_eq!(value["type"], "response");
        assert_eq!(value["payload"]["source"], "old.ipynb");

        let text = command(serde_json::json!({ "command": "matrix", "name": "df" }));
        let value = parse(handle_text_message(&text, &service).await);
        assert_eq!(value["type"], "error");
        assert_eq!(
            value["payload"]["code"],
            InspectorError::MatrixUnsupported.error_code()
        );
    }
}
