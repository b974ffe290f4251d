//! Batch-level progress and the once-per-action downstream effects.

use serde::Serialize;
use tracing::info;

use crate::document_api::DocumentApi;

use super::BatchUploader;
use super::events::{CacheKey, Notification, NotificationLevel};
use super::types::{BatchOptions, ItemResult, UploadItem};

/// `round(100 * settled / total)`, recomputed from a snapshot; 0 for an empty batch
pub fn overall_progress(items: &[UploadItem]) -> u8 {
    let total = items.len();
    if total == 0 {
        return 0;
    }
    let settled = items.iter().filter(|item| item.status.is_settled()).count();
    ((settled * 200 + total) / (total * 2)) as u8
}

/// Outcome counts of one batch run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn from_results(results: &[ItemResult]) -> Self {
        let failed = results.iter().filter(|r| !r.is_success()).count();
        Self {
            succeeded: results.len() - failed,
            failed,
        }
    }
}

impl<A: DocumentApi> BatchUploader<A> {
    /// Emit the single notification and invalidation for a finished batch.
    ///
    /// An abandoned batch stays silent and only invalidates when it managed to
    /// create documents before it was cut off.
    pub(crate) fn finish_batch(
        &self,
        results: &[ItemResult],
        options: &BatchOptions,
        abandoned: bool,
    ) -> BatchSummary {
        let summary = BatchSummary::from_results(results);
        record_batch_metrics(summary, abandoned);

        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            abandoned,
            collection_id = %options.collection_id,
            "Upload batch finished"
        );

        if abandoned {
            if summary.succeeded > 0 {
                self.invalidate_collection(options);
            }
            return summary;
        }

        let notification = if summary.failed == 0 {
            Notification::new(
                NotificationLevel::Success,
                self.i18n.format_counts(
                    &self.locale,
                    "upload-batch-success",
                    &[("count", summary.succeeded)],
                ),
            )
        } else {
            let level = if summary.succeeded == 0 {
                NotificationLevel::Error
            } else {
                NotificationLevel::Warning
            };
            Notification::new(
                level,
                self.i18n.format_counts(
                    &self.locale,
                    "upload-batch-partial",
                    &[("succeeded", summary.succeeded), ("failed", summary.failed)],
                ),
            )
        };

        self.events.notify(notification);
        self.invalidate_collection(options);
        summary
    }

    /// Report a retry the same way as a batch of one
    pub(crate) fn finish_retry(&self, result: &ItemResult, options: &BatchOptions) {
        let summary = BatchSummary::from_results(std::slice::from_ref(result));
        record_metrics("retry", summary);

        let notification = match &result.error {
            None => Notification::new(
                NotificationLevel::Success,
                self.i18n.get(&self.locale, "upload-retry-success", None),
            ),
            Some(error) => Notification::new(
                NotificationLevel::Error,
                self.i18n
                    .format(&self.locale, "upload-retry-failed", &[("error", error.as_str())]),
            ),
        };

        info!(item_id = %result.id, succeeded = result.is_success(), "Retry finished");

        self.events.notify(notification);
        self.invalidate_collection(options);
    }

    fn invalidate_collection(&self, options: &BatchOptions) {
        self.events
            .invalidate(&CacheKey::for_collection(&options.collection_id));
    }
}

/// Cancelled items of an abandoned batch are not failures; only its
/// completed documents are counted.
fn record_batch_metrics(summary: BatchSummary, abandoned: bool) {
    if abandoned {
        metrics::counter!("upload_batches_total", "kind" => "abandoned").increment(1);
        metrics::counter!("upload_items_total", "outcome" => "succeeded")
            .increment(summary.succeeded as u64);
        return;
    }
    record_metrics("batch", summary);
}

fn record_metrics(kind: &'static str, summary: BatchSummary) {
    metrics::counter!("upload_batches_total", "kind" => kind).increment(1);
    metrics::counter!("upload_items_total", "outcome" => "succeeded")
        .increment(summary.succeeded as u64);
    metrics::counter!("upload_items_total", "outcome" => "failed")
        .increment(summary.failed as u64);
}
