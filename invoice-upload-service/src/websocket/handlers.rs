//! WebSocket message handlers.
//!
//! Contains the logic for handling incoming WebSocket connections,
//! processing client messages, and fanning out registry changes.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::document_api::DocumentApi;
use crate::upload::BatchUploader;

use super::manager::WebSocketManager;
use super::messages::{ClientMessage, ServerMessage};

/// Handle a WebSocket connection
///
/// Manages the connection lifecycle, processes incoming messages,
/// and forwards outgoing messages.
pub async fn handle_ws_connection<A: DocumentApi>(
    socket: WebSocket,
    ws_manager: Arc<WebSocketManager>,
    uploader: Arc<BatchUploader<A>>,
) {
    let session_id = uuid::Uuid::new_v4().to_string();
    info!(session_id = %session_id, "New WebSocket connection");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (msg_tx, mut msg_rx) = mpsc::unbounded_channel::<ServerMessage>();

    ws_manager.add_connection(session_id.clone(), msg_tx);

    let session_id_clone = session_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = msg_rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if ws_tx.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    error!(error = %e, "Failed to serialize WebSocket message");
                }
            }
        }
        debug!(session_id = %session_id_clone, "WebSocket send task ended");
    });

    while let Some(result) = ws_rx.next().await {
        match result {
            Ok(Message::Text(text)) => {
                handle_client_message(&session_id, &text, &ws_manager, &uploader);
            }
            Ok(Message::Binary(data)) => {
                if let Ok(text) = String::from_utf8(data.to_vec()) {
                    handle_client_message(&session_id, &text, &ws_manager, &uploader);
                }
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(session_id = %session_id, "WebSocket connection closed by client");
                break;
            }
            Err(e) => {
                error!(session_id = %session_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    ws_manager.remove_connection(&session_id);
    send_task.abort();
    info!(session_id = %session_id, "WebSocket connection closed");
}

fn handle_client_message<A: DocumentApi>(
    session_id: &str,
    text: &str,
    ws_manager: &WebSocketManager,
    uploader: &BatchUploader<A>,
) {
    let msg: ClientMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!(
                session_id = %session_id,
                error = %e,
                text = %text,
                "Failed to parse client message"
            );
            ws_manager.send_to(
                session_id,
                ServerMessage::Error {
                    code: "parse_error".to_string(),
                    message: format!("Failed to parse message: {}", e),
                    recoverable: true,
                },
            );
            return;
        }
    };

    match msg {
        ClientMessage::Ping => {
            let timestamp = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0);

            ws_manager.send_to(session_id, ServerMessage::Pong { timestamp });
        }
        ClientMessage::SubscribeUploads => {
            ws_manager.set_upload_subscription(session_id, true);
            ws_manager.send_to(
                session_id,
                ServerMessage::Snapshot {
                    snapshot: uploader.current_snapshot(),
                },
            );
        }
        ClientMessage::UnsubscribeUploads => {
            ws_manager.set_upload_subscription(session_id, false);
        }
    }
}

/// Push a snapshot to subscribers after every registry change.
///
/// Bursts of progress reports coalesce into one snapshot.
pub async fn broadcast_snapshots<A: DocumentApi>(
    uploader: Arc<BatchUploader<A>>,
    ws_manager: Arc<WebSocketManager>,
) {
    let mut changes = uploader.subscribe();
    while changes.changed().await.is_ok() {
        if ws_manager.upload_subscriber_count() > 0 {
            ws_manager.broadcast_snapshot(uploader.current_snapshot());
        }
    }
    debug!("Upload snapshot broadcaster stopped");
}
