//! Broadcast functions for WebSocket updates.
//!
//! Snapshots go to upload subscribers only. Notifications and cache
//! invalidations go to every connection, since any open dashboard view may
//! hold the stale queries.

use tracing::debug;

use crate::upload::{CacheKey, Notification, UploadEvents, UploadSnapshot};

use super::manager::WebSocketManager;
use super::messages::ServerMessage;

impl WebSocketManager {
    /// Push the current upload state to all subscribed connections
    pub fn broadcast_snapshot(&self, snapshot: UploadSnapshot) {
        let msg = ServerMessage::Snapshot { snapshot };
        let mut sent_count = 0;

        for entry in self.connections.iter() {
            let conn = entry.value();
            if conn.subscribed_to_uploads && conn.tx.send(msg.clone()).is_ok() {
                sent_count += 1;
            }
        }

        if sent_count > 0 {
            debug!(sent_count = sent_count, "Broadcast upload snapshot to connections");
        }
    }

    fn broadcast_all(&self, msg: ServerMessage) -> usize {
        self.connections
            .iter()
            .filter(|entry| entry.value().tx.send(msg.clone()).is_ok())
            .count()
    }
}

impl UploadEvents for WebSocketManager {
    fn notify(&self, notification: Notification) {
        let sent_count = self.broadcast_all(notification.into());
        debug!(sent_count = sent_count, "Broadcast upload notification");
    }

    fn invalidate(&self, keys: &[CacheKey]) {
        let sent_count = self.broadcast_all(ServerMessage::InvalidateQueries {
            keys: keys.to_vec(),
        });
        debug!(
            sent_count = sent_count,
            keys = keys.len(),
            "Broadcast query invalidation"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::NotificationLevel;
    use tokio::sync::mpsc;

    fn empty_snapshot() -> UploadSnapshot {
        UploadSnapshot {
            items: Vec::new(),
            overall_progress_percent: 0,
            is_running: false,
        }
    }

    #[test]
    fn test_snapshot_reaches_subscribers_only() {
        let manager = WebSocketManager::new();
        let (sub_tx, mut sub_rx) = mpsc::unbounded_channel();
        let (idle_tx, mut idle_rx) = mpsc::unbounded_channel();
        manager.add_connection("subscriber".to_string(), sub_tx);
        manager.add_connection("idle".to_string(), idle_tx);
        manager.set_upload_subscription("subscriber", true);

        manager.broadcast_snapshot(empty_snapshot());

        assert!(matches!(
            sub_rx.try_recv(),
            Ok(ServerMessage::Snapshot { .. })
        ));
        assert!(idle_rx.try_recv().is_err());
    }

    #[test]
    fn test_events_reach_every_connection() {
        let manager = WebSocketManager::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        manager.add_connection("a".to_string(), tx_a);
        manager.add_connection("b".to_string(), tx_b);
        manager.set_upload_subscription("a", true);

        manager.notify(Notification::new(NotificationLevel::Success, "Uploaded 1 document"));
        manager.invalidate(&CacheKey::for_collection("col-1"));

        for rx in [&mut rx_a, &mut rx_b] {
            assert!(matches!(
                rx.try_recv(),
                Ok(ServerMessage::Notification { level: NotificationLevel::Success, .. })
            ));
            match rx.try_recv() {
                Ok(ServerMessage::InvalidateQueries { keys }) => assert_eq!(keys.len(), 4),
                other => panic!("Expected InvalidateQueries, got {:?}", other),
            }
        }
    }
}
