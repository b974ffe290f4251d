//! Batch upload orchestration.
//!
//! A batch is a user-selected set of files pushed through
//! upload → document creation with bounded concurrency:
//! - Item registry (authoritative per-item state, immutable snapshots)
//! - Per-item pipeline
//! - Wave scheduler
//! - Retry of single failed items
//! - Aggregation (overall progress, summary notification, cache invalidation)

mod aggregate;
mod events;
mod pipeline;
mod registry;
mod retry;
mod scheduler;
mod types;


pub use aggregate::{BatchSummary, overall_progress};
pub use events::{CacheKey, Notification, NotificationLevel, UploadEvents};
pub use registry::ItemRegistry;
pub use types::{
    BatchOptions, DOCUMENT_TYPE, ItemResult, ItemUpdate, ParseMode, SourceFile, UploadItem,
    UploadSnapshot, UploadStatus, UploadedFileRef,
};

use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::DEFAULT_CONCURRENCY_LIMIT;
use crate::document_api::DocumentApi;
use crate::i18n::I18n;

use pipeline::ItemRun;

/// Owns the active batch and drives it through the document service
pub struct BatchUploader<A> {
    api: Arc<A>,
    registry: Arc<ItemRegistry>,
    events: Arc<dyn UploadEvents>,
    i18n: Arc<I18n>,
    locale: String,
    concurrency_limit: usize,
    /// Batch settings per item id, reused by retries
    contexts: DashMap<String, BatchOptions>,
    /// Batch runs and retries currently in flight
    active_runs: AtomicUsize,
    /// Cancels the waves of the current batch
    batch_token: Mutex<CancellationToken>,
}

impl<A: DocumentApi> BatchUploader<A> {
    pub fn new(api: Arc<A>, events: Arc<dyn UploadEvents>, i18n: Arc<I18n>) -> Self {
        Self {
            api,
            registry: Arc::new(ItemRegistry::new()),
            events,
            i18n,
            locale: "en".to_string(),
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
            contexts: DashMap::new(),
            active_runs: AtomicUsize::new(0),
            batch_token: Mutex::new(CancellationToken::new()),
        }
    }

    /// Maximum number of items uploading at once within a batch (at least one)
    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit.max(1);
        self
    }

    /// Locale for notification text
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    pub fn registry(&self) -> &Arc<ItemRegistry> {
        &self.registry
    }

    /// Start a new selection: one `pending` item per file.
    ///
    /// Replaces the previous selection and abandons any batch still in flight.
    pub fn select_files(&self, files: Vec<SourceFile>) -> Vec<UploadItem> {
        self.cancel_current_batch();
        let items: Vec<UploadItem> = files.into_iter().map(UploadItem::new).collect();
        self.contexts.clear();
        self.registry.initialize(items.clone());
        info!(count = items.len(), "Files selected for upload");
        items
    }

    /// Change the document name of an item that is not in flight.
    pub fn rename_item(&self, item_id: &str, display_name: &str) -> bool {
        self.registry.update_if(
            item_id,
            |status| matches!(status, UploadStatus::Pending | UploadStatus::Error),
            &ItemUpdate::display_name(display_name),
        )
    }

    /// Upload `items` in waves and create a document for each.
    ///
    /// Never fails: per-item errors are part of the returned results. An empty
    /// selection or a blank collection id is a no-op.
    pub async fn run_batch(&self, items: Vec<UploadItem>, options: BatchOptions) -> Vec<ItemResult> {
        if items.is_empty() || options.collection_id.trim().is_empty() {
            debug!("Nothing to upload, skipping batch");
            return Vec::new();
        }

        let token = self.begin_batch();
        let _run = self.track_run();

        self.contexts.clear();
        for item in &items {
            self.contexts.insert(item.id.clone(), options.clone());
        }
        let epoch = self.registry.initialize(items);
        let items = self.registry.snapshot().items.clone();

        info!(
            count = items.len(),
            collection_id = %options.collection_id,
            parse_mode = %options.parse_mode.as_str(),
            concurrency_limit = self.concurrency_limit,
            "Starting upload batch"
        );

        let run = ItemRun {
            options: &options,
            token: &token,
            epoch,
        };
        let results = self.run_waves(items, &run).await;
        self.finish_batch(&results, &options, token.is_cancelled());
        results
    }

    /// Dismiss one row, regardless of its state
    pub fn remove_item(&self, item_id: &str) -> bool {
        self.contexts.remove(item_id);
        self.registry.remove(item_id)
    }

    /// Drop the whole selection and abandon any batch in flight
    pub fn clear_all(&self) {
        self.cancel_current_batch();
        self.contexts.clear();
        self.registry.clear();
        info!("Upload selection cleared");
    }

    pub fn current_snapshot(&self) -> UploadSnapshot {
        let items = self.registry.snapshot().items.clone();
        UploadSnapshot {
            overall_progress_percent: overall_progress(&items),
            items,
            is_running: self.is_running(),
        }
    }

    /// Ticks after every registry mutation or run state change
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.registry.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.active_runs.load(Ordering::SeqCst) > 0
    }

    /// Cancel the previous batch and install a fresh token for a new one
    fn begin_batch(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let previous = {
            let mut current = self.batch_token.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *current, token.clone())
        };
        previous.cancel();
        token
    }

    fn cancel_current_batch(&self) {
        let current = self
            .batch_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if !current.is_cancelled() {
            debug!("Cancelling in-flight batch");
            current.cancel();
        }
    }

    fn track_run(&self) -> RunGuard<'_> {
        self.active_runs.fetch_add(1, Ordering::SeqCst);
        self.registry.notify();
        RunGuard {
            active_runs: &self.active_runs,
            registry: &self.registry,
        }
    }
}

/// Marks a batch or retry as running for as long as it is held
struct RunGuard<'a> {
    active_runs: &'a AtomicUsize,
    registry: &'a ItemRegistry,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.active_runs.fetch_sub(1, Ordering::SeqCst);
        self.registry.notify();
    }
}
