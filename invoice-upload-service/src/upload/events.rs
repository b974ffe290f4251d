//! Downstream effects of a finished batch: user notifications and cache invalidation.

use serde::Serialize;

/// Severity of a user-facing notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Success,
    Warning,
    Error,
}

/// One toast shown to the user per batch action
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

impl Notification {
    pub fn new(level: NotificationLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

/// Client-side query caches that go stale once documents are created
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "query", rename_all = "snake_case")]
pub enum CacheKey {
    /// Documents listed under one collection
    CollectionDocuments { collection_id: String },
    /// Global document list
    Documents,
    /// Global collection list
    Collections,
    /// Detail view of one collection
    Collection { collection_id: String },
}

impl CacheKey {
    /// Everything a batch into `collection_id` makes stale
    pub fn for_collection(collection_id: &str) -> Vec<CacheKey> {
        vec![
            CacheKey::CollectionDocuments {
                collection_id: collection_id.to_string(),
            },
            CacheKey::Documents,
            CacheKey::Collections,
            CacheKey::Collection {
                collection_id: collection_id.to_string(),
            },
        ]
    }
}

/// Sink for batch-level effects
pub trait UploadEvents: Send + Sync {
    fn notify(&self, notification: Notification);

    fn invalidate(&self, keys: &[CacheKey]);
}
