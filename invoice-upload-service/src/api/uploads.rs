//! Upload selection and batch endpoints.

use axum::{
    Json,
    extract::{Multipart, Path, State, multipart::Field},
};
use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::document_api::DocumentApi;
use crate::error::{ServiceError, ServiceResult};
use crate::upload::{
    BatchOptions, BatchSummary, ItemResult, ParseMode, SourceFile, UploadItem, UploadSnapshot,
    UploadStatus,
};

use super::AppState;

/// Response for delete operations
#[derive(Serialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Deserialize)]
pub struct RenameRequest {
    pub display_name: String,
}

#[derive(Deserialize)]
pub struct RunBatchRequest {
    pub collection_id: String,
    pub parse_mode: Option<ParseMode>,
}

#[derive(Serialize)]
pub struct RunBatchResponse {
    pub results: Vec<ItemResult>,
    #[serde(flatten)]
    pub summary: BatchSummary,
}

fn invalid_request(e: impl std::fmt::Display) -> ServiceError {
    ServiceError::InvalidRequest {
        message: e.to_string(),
    }
}

pub async fn get_uploads_handler<A: DocumentApi>(
    State(state): State<Arc<AppState<A>>>,
) -> Json<UploadSnapshot> {
    Json(state.uploader.current_snapshot())
}

/// Replace the selection with the `file` fields of a multipart body
pub async fn select_files_handler<A: DocumentApi>(
    State(state): State<Arc<AppState<A>>>,
    mut multipart: Multipart,
) -> ServiceResult<Json<UploadSnapshot>> {
    let mut files = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(invalid_request)? {
        if field.name() == Some("file") {
            files.push(read_file_field(field, state.max_file_size_bytes).await?);
        }
    }

    if files.is_empty() {
        return Err(invalid_request("No files provided"));
    }

    state.uploader.select_files(files);
    Ok(Json(state.uploader.current_snapshot()))
}

/// Buffer one file field, stopping as soon as it exceeds `max` bytes
async fn read_file_field(mut field: Field<'_>, max: u64) -> ServiceResult<SourceFile> {
    let name = field.file_name().unwrap_or("document").to_string();
    let content_type = field.content_type().map(str::to_string);
    let mut data = BytesMut::new();

    while let Some(chunk) = field.chunk().await.map_err(invalid_request)? {
        let size = (data.len() + chunk.len()) as u64;
        if size > max {
            debug!(file = %name, max, "Rejecting oversized file");
            return Err(ServiceError::FileTooLarge { size, max });
        }
        data.extend_from_slice(&chunk);
    }

    Ok(SourceFile::new(name, content_type.as_deref(), data.freeze()))
}

pub async fn rename_upload_handler<A: DocumentApi>(
    State(state): State<Arc<AppState<A>>>,
    Path(id): Path<String>,
    Json(request): Json<RenameRequest>,
) -> ServiceResult<Json<UploadItem>> {
    let Some(item) = state.uploader.registry().get(&id) else {
        return Err(ServiceError::ItemNotFound { item_id: id });
    };

    if !state.uploader.rename_item(&id, &request.display_name) {
        return Err(invalid_request(format!(
            "Upload cannot be renamed while {}",
            item.status
        )));
    }

    state
        .uploader
        .registry()
        .get(&id)
        .map(Json)
        .ok_or(ServiceError::ItemNotFound { item_id: id })
}

/// Run every pending item of the current selection as one batch
pub async fn run_batch_handler<A: DocumentApi>(
    State(state): State<Arc<AppState<A>>>,
    Json(request): Json<RunBatchRequest>,
) -> ServiceResult<Json<RunBatchResponse>> {
    if request.collection_id.trim().is_empty() {
        return Err(invalid_request("collection_id is required"));
    }

    let options = BatchOptions::new(
        request.collection_id,
        request
            .parse_mode
            .unwrap_or_else(|| state.default_parse_mode.clone()),
    );
    let items: Vec<UploadItem> = state
        .uploader
        .current_snapshot()
        .items
        .into_iter()
        .filter(|item| item.status == UploadStatus::Pending)
        .collect();

    info!(count = items.len(), "Batch requested over HTTP");

    // Detached so a dropped request does not strand items mid-pipeline
    let uploader = state.uploader.clone();
    let results = tokio::spawn(async move { uploader.run_batch(items, options).await })
        .await
        .map_err(|e| ServiceError::Internal {
            message: format!("Batch task failed: {}", e),
        })?;

    Ok(Json(RunBatchResponse {
        summary: BatchSummary::from_results(&results),
        results,
    }))
}

pub async fn retry_upload_handler<A: DocumentApi>(
    State(state): State<Arc<AppState<A>>>,
    Path(id): Path<String>,
) -> ServiceResult<Json<ItemResult>> {
    let uploader = state.uploader.clone();
    let item_id = id.clone();
    let result = tokio::spawn(async move { uploader.retry_item(&item_id).await })
        .await
        .map_err(|e| ServiceError::Internal {
            message: format!("Retry task failed: {}", e),
        })?;

    result
        .map(Json)
        .ok_or(ServiceError::ItemNotFound { item_id: id })
}

pub async fn remove_upload_handler<A: DocumentApi>(
    State(state): State<Arc<AppState<A>>>,
    Path(id): Path<String>,
) -> ServiceResult<Json<DeleteResponse>> {
    if !state.uploader.remove_item(&id) {
        return Err(ServiceError::ItemNotFound { item_id: id });
    }

    Ok(Json(DeleteResponse {
        success: true,
        message: format!("Upload {} removed", id),
    }))
}

pub async fn clear_uploads_handler<A: DocumentApi>(
    State(state): State<Arc<AppState<A>>>,
) -> Json<DeleteResponse> {
    state.uploader.clear_all();
    Json(DeleteResponse {
        success: true,
        message: "Upload selection cleared".to_string(),
    })
}
