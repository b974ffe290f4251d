use std::sync::Arc;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::net::TcpListener;
use tracing::info;

mod api;
mod config;
mod document_api;
mod error;
mod i18n;
mod upload;
mod websocket;

use crate::api::AppState;
use crate::config::ServiceConfig;
use crate::document_api::HttpDocumentApi;
use crate::i18n::I18n;
use crate::upload::BatchUploader;
use crate::websocket::WebSocketManager;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    info!(
        "Starting invoice upload service v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config = ServiceConfig::load()?;
    info!(
        host = %config.server.host,
        port = config.server.port,
        document_api = %config.document_api.base_url,
        concurrency_limit = config.uploads.effective_concurrency_limit(),
        "Configuration loaded"
    );

    let metrics = PrometheusBuilder::new().install_recorder()?;

    let i18n = Arc::new(I18n::new());
    let ws_manager = Arc::new(WebSocketManager::new());
    let api = Arc::new(HttpDocumentApi::new(config.document_api.clone())?);

    let uploader = Arc::new(
        BatchUploader::new(api, ws_manager.clone(), i18n.clone())
            .with_concurrency_limit(config.uploads.effective_concurrency_limit())
            .with_locale(config.locale.clone()),
    );

    // Push upload snapshots to dashboard subscribers
    tokio::spawn(websocket::broadcast_snapshots(
        uploader.clone(),
        ws_manager.clone(),
    ));

    let app = api::router(AppState {
        uploader,
        ws_manager,
        i18n,
        locale: config.locale.clone(),
        metrics,
        start_time: Instant::now(),
        max_file_size_bytes: config.uploads.max_file_size_bytes,
        default_parse_mode: config.uploads.default_parse_mode.clone(),
    });

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let format = fmt::format()
        .with_target(true)
        .with_thread_ids(true)
        .compact();

    // Use RUST_LOG if set, otherwise default to info level for our crate
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("invoice_upload_service=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().event_format(format))
        .with(filter)
        .init();
}
