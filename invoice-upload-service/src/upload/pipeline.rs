//! Per-item pipeline: upload the raw file, then register a document for it.

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::document_api::{CreateDocumentRequest, DocumentApi, ProgressCallback};
use crate::error::ApiError;

use super::BatchUploader;
use super::types::{BatchOptions, DOCUMENT_TYPE, ItemResult, ItemUpdate, UploadItem, UploadStatus};

/// Settings shared by the pipeline runs of one batch (or one retry)
pub(crate) struct ItemRun<'a> {
    pub(crate) options: &'a BatchOptions,
    pub(crate) token: &'a CancellationToken,
    /// Registry epoch the run writes into
    pub(crate) epoch: u64,
}

impl<A: DocumentApi> BatchUploader<A> {
    /// Drive one item through upload and document creation.
    ///
    /// Never fails: every error is recorded on the item and returned in the result.
    /// The raw file is not re-sent on failure.
    pub(crate) async fn run_item(&self, item: UploadItem, run: &ItemRun<'_>) -> ItemResult {
        let id = item.id.clone();
        let epoch = run.epoch;

        let started = self.registry.update_in(
            epoch,
            &id,
            &ItemUpdate::status(UploadStatus::Uploading)
                .with_progress(0)
                .clearing_error(),
        );
        if !started {
            // Dismissed before its wave started, or the batch was superseded
            debug!(item_id = %id, "Item no longer pending in this batch, skipping");
            return abandoned(id);
        }

        let on_progress: ProgressCallback = {
            let registry = Arc::clone(&self.registry);
            let id = id.clone();
            Arc::new(move |percent: u8| {
                registry.record_progress_in(epoch, &id, percent);
            })
        };

        let upload = self
            .api
            .upload(&item.file, &run.options.collection_id, on_progress);
        let uploaded = match cancellable(run.token, upload).await {
            Ok(uploaded) => uploaded,
            Err(_) if run.token.is_cancelled() => return abandoned(id),
            Err(e) => {
                let message = e.to_string();
                warn!(item_id = %id, file = %item.file.name, error = %message, "Upload failed");
                self.registry.update_in(
                    epoch,
                    &id,
                    &ItemUpdate::status(UploadStatus::Error).with_error(message.clone()),
                );
                return ItemResult::failed(id, message);
            }
        };

        self.registry.update_in(
            epoch,
            &id,
            &ItemUpdate::status(UploadStatus::Uploaded)
                .with_progress(100)
                .with_uploaded_file(uploaded.clone()),
        );
        self.registry.update_in(
            epoch,
            &id,
            &ItemUpdate::status(UploadStatus::CreatingDocument),
        );

        // Renames land while the item waits for its wave
        let name = self
            .registry
            .get_in(epoch, &id)
            .unwrap_or(item)
            .document_name();

        let request = CreateDocumentRequest {
            file_id: uploaded.id,
            collection_id: run.options.collection_id.clone(),
            name,
            document_type: DOCUMENT_TYPE,
            parse_mode: run.options.parse_mode.clone(),
        };

        match cancellable(run.token, self.api.create_document(request)).await {
            Ok(document) => {
                debug!(item_id = %id, document_id = %document.id, "Document created");
                self.registry.update_in(
                    epoch,
                    &id,
                    &ItemUpdate::status(UploadStatus::Completed).with_document_id(&document.id),
                );
                ItemResult::succeeded(id, document.id)
            }
            Err(_) if run.token.is_cancelled() => abandoned(id),
            Err(e) => {
                // Distinct from upload failures: the file is stored but not registered
                let error = e.to_string();
                let message = self.i18n.format(
                    &self.locale,
                    "upload-document-creation-failed",
                    &[("error", error.as_str())],
                );
                warn!(item_id = %id, error = %e, "Document creation failed");
                self.registry.update_in(
                    epoch,
                    &id,
                    &ItemUpdate::status(UploadStatus::Error).with_error(message.clone()),
                );
                ItemResult::failed(id, message)
            }
        }
    }
}

/// Run `operation` unless `token` fires first
async fn cancellable<T>(
    token: &CancellationToken,
    operation: impl Future<Output = Result<T, ApiError>>,
) -> Result<T, ApiError> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(ApiError::Cancelled),
        result = operation => result,
    }
}

/// Result for an item whose batch was abandoned; the registry is left alone.
fn abandoned(id: String) -> ItemResult {
    debug!(item_id = %id, "Pipeline abandoned");
    ItemResult::failed(id, ApiError::Cancelled.to_string())
}
