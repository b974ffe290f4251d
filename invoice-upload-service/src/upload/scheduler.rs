//! Wave scheduler.
//!
//! Items run in consecutive windows of `concurrency_limit`. Every item of a window
//! settles before the next window starts; nothing short-circuits on failure.

use futures::future::join_all;
use tracing::{debug, info};

use crate::document_api::DocumentApi;

use super::BatchUploader;
use super::pipeline::ItemRun;
use super::types::{ItemResult, UploadItem};

impl<A: DocumentApi> BatchUploader<A> {
    pub(crate) async fn run_waves(&self, items: Vec<UploadItem>, run: &ItemRun<'_>) -> Vec<ItemResult> {
        let mut results = Vec::with_capacity(items.len());
        let waves = items.len().div_ceil(self.concurrency_limit);

        for (wave, window) in items.chunks(self.concurrency_limit).enumerate() {
            if run.token.is_cancelled() {
                info!(
                    completed_waves = wave,
                    remaining_items = items.len() - results.len(),
                    "Batch abandoned, not starting further waves"
                );
                break;
            }

            debug!(wave = wave + 1, waves, size = window.len(), "Starting upload wave");

            // run_item never fails, so join_all is a settle-all barrier
            let settled = join_all(window.iter().cloned().map(|item| self.run_item(item, run))).await;

            debug!(
                wave = wave + 1,
                failed = settled.iter().filter(|r| !r.is_success()).count(),
                "Upload wave settled"
            );
            results.extend(settled);
        }

        results
    }
}
