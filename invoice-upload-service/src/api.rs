//! HTTP API for the invoice upload service.
//!
//! This module provides the REST API endpoints for:
//! - Health and metrics monitoring
//! - Upload selection, batch runs and retries
//! - WebSocket connections

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State, WebSocketUpgrade},
    http::{StatusCode, header},
    response::IntoResponse,
    routing::{get, patch, post},
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::document_api::DocumentApi;
use crate::i18n::I18n;
use crate::upload::{BatchUploader, ParseMode};
use crate::websocket::{WebSocketManager, handle_ws_connection};

pub mod uploads;
use uploads::{
    clear_uploads_handler, get_uploads_handler, remove_upload_handler, rename_upload_handler,
    retry_upload_handler, run_batch_handler, select_files_handler,
};

/// Application state
pub struct AppState<A> {
    pub uploader: Arc<BatchUploader<A>>,
    pub ws_manager: Arc<WebSocketManager>,
    pub i18n: Arc<I18n>,
    pub locale: String,
    pub metrics: PrometheusHandle,
    pub start_time: Instant,
    /// Per-file limit for multipart intake
    pub max_file_size_bytes: u64,
    /// Used when a run request does not name a parse mode
    pub default_parse_mode: ParseMode,
}

/// Build the API router
pub fn router<A: DocumentApi>(state: AppState<A>) -> Router {
    let state = Arc::new(state);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route(
            "/uploads",
            get(get_uploads_handler::<A>)
                .post(select_files_handler::<A>)
                .delete(clear_uploads_handler::<A>)
                // Size is enforced per file while reading the multipart stream
                .layer(DefaultBodyLimit::disable()),
        )
        .route("/uploads/run", post(run_batch_handler::<A>))
        .route(
            "/uploads/{id}",
            patch(rename_upload_handler::<A>).delete(remove_upload_handler::<A>),
        )
        .route("/uploads/{id}/retry", post(retry_upload_handler::<A>));

    Router::new()
        .route("/health", get(health_handler::<A>))
        .route("/metrics", get(metrics_handler::<A>))
        .route("/ws", get(ws_handler::<A>))
        .nest("/api", api_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// === Health & Metrics ===

async fn health_handler<A: DocumentApi>(
    State(state): State<Arc<AppState<A>>>,
) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: state.i18n.get(&state.locale, "health-status-healthy", None),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        upload_running: state.uploader.is_running(),
        websocket_connections: state.ws_manager.connection_count(),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    uptime_seconds: u64,
    upload_running: bool,
    websocket_connections: usize,
}

async fn metrics_handler<A: DocumentApi>(
    State(state): State<Arc<AppState<A>>>,
) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

// === WebSocket ===

async fn ws_handler<A: DocumentApi>(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState<A>>>,
) -> impl IntoResponse {
    info!("WebSocket upgrade request received");
    ws.on_upgrade(move |socket| {
        handle_ws_connection(socket, state.ws_manager.clone(), state.uploader.clone())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::document_api::{CreateDocumentRequest, CreatedDocument, ProgressCallback};
    use crate::error::ApiError;
    use crate::upload::{SourceFile, UploadedFileRef};

    const BOUNDARY: &str = "upload-test-boundary";

    /// Document service that accepts everything except files named `reject.pdf`
    struct StubApi;

    impl DocumentApi for StubApi {
        async fn upload(
            &self,
            file: &SourceFile,
            _collection_id: &str,
            on_progress: ProgressCallback,
        ) -> Result<UploadedFileRef, ApiError> {
            on_progress(100);
            if file.name == "reject.pdf" {
                return Err(ApiError::Status {
                    status: 415,
                    message: "Unsupported file".to_string(),
                });
            }
            Ok(UploadedFileRef {
                id: format!("file-{}", file.name),
                filename: None,
            })
        }

        async fn create_document(
            &self,
            request: CreateDocumentRequest,
        ) -> Result<CreatedDocument, ApiError> {
            Ok(CreatedDocument {
                id: format!("doc-{}", request.name),
            })
        }
    }

    fn app() -> Router {
        let i18n = Arc::new(I18n::new());
        let ws_manager = Arc::new(WebSocketManager::new());
        let uploader = Arc::new(BatchUploader::new(
            Arc::new(StubApi),
            ws_manager.clone(),
            i18n.clone(),
        ));

        router(AppState {
            uploader,
            ws_manager,
            i18n,
            locale: "en".to_string(),
            metrics: PrometheusBuilder::new().build_recorder().handle(),
            start_time: Instant::now(),
            max_file_size_bytes: 16,
            default_parse_mode: ParseMode::default(),
        })
    }

    fn multipart_body(files: &[(&str, &str)]) -> Body {
        let mut body = String::new();
        for (name, content) in files {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{name}\"\r\nContent-Type: application/pdf\r\n\r\n{content}\r\n"
            ));
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));
        Body::from(body)
    }

    fn select_request(files: &[(&str, &str)]) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/uploads")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(multipart_body(files))
            .unwrap()
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn empty_request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_health() {
        let (status, json) = send(&app(), empty_request("GET", "/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "Service is healthy");
        assert_eq!(json["upload_running"], false);
    }

    #[tokio::test]
    async fn test_metrics_endpoint_is_plain_text() {
        let response = app()
            .oneshot(empty_request("GET", "/metrics"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; version=0.0.4"
        );
    }

    #[tokio::test]
    async fn test_select_then_run_batch() {
        let app = app();

        let (status, json) = send(
            &app,
            select_request(&[("march.pdf", "%PDF-1"), ("reject.pdf", "%PDF-2")]),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let items = json["items"].as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["display_name"], "march");
        assert_eq!(items[0]["status"], "pending");

        let (status, json) = send(
            &app,
            json_request("POST", "/api/uploads/run", serde_json::json!({ "collection_id": "col-1" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["succeeded"], 1);
        assert_eq!(json["failed"], 1);
        assert_eq!(json["results"].as_array().unwrap().len(), 2);

        let (_, json) = send(&app, empty_request("GET", "/api/uploads")).await;
        assert_eq!(json["overall_progress_percent"], 100);
        assert_eq!(json["is_running"], false);
        assert_eq!(json["items"][1]["error_message"], "Unsupported file (status 415)");
    }

    #[tokio::test]
    async fn test_oversized_file_is_rejected() {
        let app = app();
        let (status, json) = send(
            &app,
            select_request(&[("huge.pdf", "this body is longer than sixteen bytes")]),
        )
        .await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(json["code"], "file_too_large");

        let (_, json) = send(&app, empty_request("GET", "/api/uploads")).await;
        assert!(json["items"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_select_without_files_is_bad_request() {
        let (status, json) = send(&app(), select_request(&[])).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["code"], "invalid_request");
    }

    #[tokio::test]
    async fn test_rename_upload() {
        let app = app();
        let (_, json) = send(&app, select_request(&[("a.pdf", "%PDF")])).await;
        let id = json["items"][0]["id"].as_str().unwrap().to_string();

        let (status, json) = send(
            &app,
            json_request(
                "PATCH",
                &format!("/api/uploads/{id}"),
                serde_json::json!({ "display_name": "Acme invoice" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["display_name"], "Acme invoice");

        let (status, json) = send(
            &app,
            json_request(
                "PATCH",
                "/api/uploads/missing",
                serde_json::json!({ "display_name": "x" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["code"], "item_not_found");
    }

    #[tokio::test]
    async fn test_run_requires_collection() {
        let (status, _) = send(
            &app(),
            json_request("POST", "/api/uploads/run", serde_json::json!({ "collection_id": " " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_retry_unknown_item_is_not_found() {
        let (status, _) = send(&app(), empty_request("POST", "/api/uploads/missing/retry")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let app = app();
        let (_, json) = send(&app, select_request(&[("a.pdf", "1"), ("b.pdf", "2")])).await;
        let id = json["items"][0]["id"].as_str().unwrap().to_string();

        let (status, json) = send(&app, empty_request("DELETE", &format!("/api/uploads/{id}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);

        let (status, _) = send(&app, empty_request("DELETE", &format!("/api/uploads/{id}"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, empty_request("DELETE", "/api/uploads")).await;
        assert_eq!(status, StatusCode::OK);

        let (_, json) = send(&app, empty_request("GET", "/api/uploads")).await;
        assert!(json["items"].as_array().unwrap().is_empty());
    }
}
