//! Contract with the external document service.
//!
//! The orchestrator only needs two calls: store a raw file, then register a
//! document that points at it. `HttpDocumentApi` talks to the real service.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;

use crate::error::ApiError;
use crate::upload::{ParseMode, SourceFile, UploadedFileRef};

mod client;

pub use client::HttpDocumentApi;

/// Upload progress sink, called with a percentage in `0..=100`.
///
/// Last value wins; calls may repeat or arrive out of order.
pub type ProgressCallback = Arc<dyn Fn(u8) + Send + Sync>;

/// Create-document request body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateDocumentRequest {
    pub file_id: String,
    pub collection_id: String,
    pub name: String,
    pub document_type: &'static str,
    pub parse_mode: ParseMode,
}

/// Created document record (only the id is used)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreatedDocument {
    pub id: String,
}

/// Upload and document-creation operations provided by the document service
pub trait DocumentApi: Send + Sync + 'static {
    /// Store a raw file in a collection, reporting progress as bytes are sent
    fn upload(
        &self,
        file: &SourceFile,
        collection_id: &str,
        on_progress: ProgressCallback,
    ) -> impl Future<Output = Result<UploadedFileRef, ApiError>> + Send;

    /// Register a document for a previously uploaded file
    fn create_document(
        &self,
        request: CreateDocumentRequest,
    ) -> impl Future<Output = Result<CreatedDocument, ApiError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::DOCUMENT_TYPE;

    #[test]
    fn test_create_document_request_shape() {
        let request = CreateDocumentRequest {
            file_id: "file-1".to_string(),
            collection_id: "col-9".to_string(),
            name: "ACME March".to_string(),
            document_type: DOCUMENT_TYPE,
            parse_mode: ParseMode::new("ocr"),
        };

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            serde_json::json!({
                "file_id": "file-1",
                "collection_id": "col-9",
                "name": "ACME March",
                "document_type": "invoice",
                "parse_mode": "ocr",
            })
        );
    }
}
