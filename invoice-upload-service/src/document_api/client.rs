use bytes::Bytes;
use futures::Stream;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use std::time::Duration;
use tracing::debug;

use crate::config::DocumentApiConfig;
use crate::error::{ApiError, ServiceError, ServiceResult};
use crate::upload::{SourceFile, UploadedFileRef};

use super::{CreateDocumentRequest, CreatedDocument, DocumentApi, ProgressCallback};

/// Size of each body chunk handed to the transport
const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Document service HTTP client
pub struct HttpDocumentApi {
    client: Client,
    config: DocumentApiConfig,
}

impl HttpDocumentApi {
    /// Create a new document service client
    pub fn new(config: DocumentApiConfig) -> ServiceResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| {
                ServiceError::Api(ApiError::Connection {
                    url: config.base_url.clone(),
                    source: e,
                })
            })?;

        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

impl DocumentApi for HttpDocumentApi {
    async fn upload(
        &self,
        file: &SourceFile,
        collection_id: &str,
        on_progress: ProgressCallback,
    ) -> Result<UploadedFileRef, ApiError> {
        let url = self.url("files");
        let content_type = file
            .content_type
            .as_deref()
            .unwrap_or(mime::APPLICATION_OCTET_STREAM.as_ref());

        let body = reqwest::Body::wrap_stream(progress_chunks(file.data.clone(), on_progress));
        let part = Part::stream_with_length(body, file.size)
            .file_name(file.name.clone())
            .mime_str(content_type)
            .map_err(|e| ApiError::InvalidRequest { source: e })?;
        let form = Form::new()
            .text("collection_id", collection_id.to_string())
            .part("file", part);

        debug!(url = %url, file = %file.name, size = file.size, "Uploading file");

        let response = self
            .authorize(self.client.post(&url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| ApiError::Connection {
                url: url.clone(),
                source: e,
            })?;

        check_status(response)
            .await?
            .json::<UploadedFileRef>()
            .await
            .map_err(|e| ApiError::InvalidResponse { source: e })
    }

    async fn create_document(
        &self,
        request: CreateDocumentRequest,
    ) -> Result<CreatedDocument, ApiError> {
        let url = self.url("documents");

        debug!(
            url = %url,
            file_id = %request.file_id,
            collection_id = %request.collection_id,
            "Creating document"
        );

        let response = self
            .authorize(self.client.post(&url))
            .json(&request)
            .send()
            .await
            .map_err(|e| ApiError::Connection {
                url: url.clone(),
                source: e,
            })?;

        check_status(response)
            .await?
            .json::<CreatedDocument>()
            .await
            .map_err(|e| ApiError::InvalidResponse { source: e })
    }
}

/// Turn non-success responses into `ApiError::Status` with the server's message
async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = error_message_from_body(&body)
        .or_else(|| status.canonical_reason().map(String::from))
        .unwrap_or_else(|| "Request failed".to_string());

    Err(ApiError::Status {
        status: status.as_u16(),
        message,
    })
}

/// Pull a human-readable message out of a JSON error body
fn error_message_from_body(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["message", "detail", "error"]
        .iter()
        .filter_map(|key| value.get(*key))
        .find_map(|field| field.as_str().map(String::from))
        .filter(|message| !message.trim().is_empty())
}

/// Split `data` into chunks, reporting progress once the transport pulls the next one.
fn progress_chunks(
    data: Bytes,
    on_progress: ProgressCallback,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static {
    async_stream::stream! {
        let total = data.len();
        let mut offset = 0;
        while offset < total {
            let end = (offset + UPLOAD_CHUNK_SIZE).min(total);
            yield Ok(data.slice(offset..end));
            on_progress(((end * 100) / total) as u8);
            offset = end;
        }
        if total == 0 {
            on_progress(100);
        }
    }
}
