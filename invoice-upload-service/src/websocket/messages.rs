//! WebSocket message types.
//!
//! Defines the client-to-server and server-to-client message formats.

use serde::{Deserialize, Serialize};

use crate::upload::{CacheKey, Notification, NotificationLevel, UploadSnapshot};

/// Messages sent from client to server
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Keepalive ping
    Ping,
    /// Receive the current upload snapshot and every change after it
    SubscribeUploads,
    /// Stop receiving upload snapshots
    UnsubscribeUploads,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Keepalive pong response
    Pong { timestamp: u64 },
    /// Full state of the upload selection
    Snapshot { snapshot: UploadSnapshot },
    /// Toast for a finished batch or retry
    Notification {
        level: NotificationLevel,
        message: String,
    },
    /// Client query caches to refetch
    InvalidateQueries { keys: Vec<CacheKey> },
    /// Error message
    Error {
        code: String,
        message: String,
        recoverable: bool,
    },
}

impl From<Notification> for ServerMessage {
    fn from(notification: Notification) -> Self {
        ServerMessage::Notification {
            level: notification.level,
            message: notification.message,
        }
    }
}
