//! Retry of a single failed item.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::document_api::DocumentApi;

use super::BatchUploader;
use super::pipeline::ItemRun;
use super::types::ItemResult;

impl<A: DocumentApi> BatchUploader<A> {
    /// Re-run one failed item with the settings of the batch that produced it.
    ///
    /// Returns `None` when there is nothing to retry: the item is gone, its batch
    /// context was cleared, or it is not in `error`. The file is uploaded again
    /// from scratch even when only document creation failed.
    pub async fn retry_item(&self, item_id: &str) -> Option<ItemResult> {
        let Some(options) = self.contexts.get(item_id).map(|entry| entry.value().clone()) else {
            debug!(item_id, "No batch context for item, nothing to retry");
            return None;
        };

        let Some((item, epoch)) = self.registry.reset_for_retry(item_id) else {
            debug!(item_id, "Item missing or not failed, nothing to retry");
            return None;
        };

        let _run = self.track_run();
        info!(item_id, file = %item.file.name, "Retrying upload");

        // A retry takes its own slot immediately; new batches do not cancel it
        let token = CancellationToken::new();
        let run = ItemRun {
            options: &options,
            token: &token,
            epoch,
        };

        let result = self.run_item(item, &run).await;
        self.finish_retry(&result, &options);
        Some(result)
    }
}
