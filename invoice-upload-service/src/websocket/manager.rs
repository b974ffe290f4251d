//! WebSocket connection manager.
//!
//! Tracks every open connection and whether it follows upload snapshots.

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;

use super::messages::ServerMessage;

/// State for a single WebSocket connection
pub(crate) struct ConnectionState {
    pub(crate) tx: mpsc::UnboundedSender<ServerMessage>,
    pub(crate) subscribed_to_uploads: bool,
}

/// Manager for all WebSocket connections
///
/// Handles connection lifecycle and message broadcasting.
pub struct WebSocketManager {
    pub(crate) connections: DashMap<String, ConnectionState>,
}

impl Default for WebSocketManager {
    fn default() -> Self {
        Self::new()
    }
}

impl WebSocketManager {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    pub(crate) fn add_connection(
        &self,
        session_id: String,
        tx: mpsc::UnboundedSender<ServerMessage>,
    ) {
        debug!(session_id = %session_id, "Adding WebSocket connection");
        self.connections.insert(
            session_id,
            ConnectionState {
                tx,
                subscribed_to_uploads: false,
            },
        );
    }

    pub(crate) fn remove_connection(&self, session_id: &str) {
        debug!(session_id = %session_id, "Removing WebSocket connection");
        self.connections.remove(session_id);
    }

    /// Set upload subscription status for a connection
    pub(crate) fn set_upload_subscription(&self, session_id: &str, subscribed: bool) {
        if let Some(mut conn) = self.connections.get_mut(session_id) {
            conn.subscribed_to_uploads = subscribed;
            debug!(
                session_id = %session_id,
                subscribed = subscribed,
                "Updated upload subscription"
            );
        }
    }

    /// Send a message to a specific connection
    pub fn send_to(&self, session_id: &str, msg: ServerMessage) {
        if let Some(conn) = self.connections.get(session_id)
            && conn.tx.send(msg).is_err()
        {
            tracing::warn!(session_id = %session_id, "Failed to send message to connection");
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn upload_subscriber_count(&self) -> usize {
        self.connections
            .iter()
            .filter(|entry| entry.value().subscribed_to_uploads)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_websocket_manager() {
        let manager = WebSocketManager::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        manager.add_connection("session1".to_string(), tx);
        assert_eq!(manager.connection_count(), 1);
        assert_eq!(manager.upload_subscriber_count(), 0);

        manager.set_upload_subscription("session1", true);
        assert_eq!(manager.upload_subscriber_count(), 1);

        manager.set_upload_subscription("session1", false);
        assert_eq!(manager.upload_subscriber_count(), 0);

        manager.remove_connection("session1");
        assert_eq!(manager.connection_count(), 0);
    }

    #[test]
    fn test_send_to_unknown_session_is_ignored() {
        let manager = WebSocketManager::new();
        manager.send_to("missing", ServerMessage::Pong { timestamp: 1 });
        assert_eq!(manager.connection_count(), 0);
    }
}
