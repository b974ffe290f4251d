//! WebSocket support for live upload updates
//!
//! Dashboard clients subscribe to the upload snapshot stream and receive the
//! batch notifications and cache invalidations without polling.

mod broadcast;
mod handlers;
mod manager;
mod messages;

pub use handlers::{broadcast_snapshots, handle_ws_connection};
pub use manager::WebSocketManager;
