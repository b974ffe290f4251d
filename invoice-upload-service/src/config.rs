//! Service configuration loaded from files and environment variables.
//!
//! Sources, lowest precedence first:
//! - `config.{toml,yaml,json}` in the working directory (optional)
//! - `INVOICE_UPLOAD__*` environment variables (`__` separates sections)

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::{ServiceError, ServiceResult};
use crate::upload::ParseMode;

/// Concurrency limit used when none is configured.
pub const DEFAULT_CONCURRENCY_LIMIT: usize = 3;

/// Top-level service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_server")]
    pub server: ServerConfig,

    #[serde(default = "default_document_api")]
    pub document_api: DocumentApiConfig,

    #[serde(default = "default_uploads")]
    pub uploads: UploadsConfig,

    /// Locale used for user-facing notifications
    #[serde(default = "default_locale")]
    pub locale: String,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// Upstream document service (file storage + document records)
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token forwarded on every request
    #[serde(default)]
    pub api_token: Option<String>,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Batch upload behaviour
#[derive(Debug, Clone, Deserialize)]
pub struct UploadsConfig {
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,

    #[serde(default = "default_max_file_size_bytes")]
    pub max_file_size_bytes: u64,

    #[serde(default)]
    pub default_parse_mode: ParseMode,
}

impl UploadsConfig {
    /// Concurrency limit, never below one.
    pub fn effective_concurrency_limit(&self) -> usize {
        self.concurrency_limit.max(1)
    }
}

impl ServiceConfig {
    /// Load configuration from file and env vars
    pub fn load() -> ServiceResult<Self> {
        Config::builder()
            .add_source(File::with_name("config").required(false))
            .add_source(
                Environment::with_prefix("INVOICE_UPLOAD")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ServiceError::Config {
                message: format!("Failed to build config: {}", e),
            })?
            .try_deserialize()
            .map_err(|e| ServiceError::Config {
                message: format!("Failed to deserialize config: {}", e),
            })
    }
}

// ==================== Default Value Functions ====================

pub(crate) fn default_server() -> ServerConfig {
    ServerConfig {
        host: default_host(),
        port: default_port(),
    }
}

pub(crate) fn default_host() -> String {
    "0.0.0.0".to_string()
}

pub(crate) fn default_port() -> u16 {
    8090
}

pub(crate) fn default_document_api() -> DocumentApiConfig {
    DocumentApiConfig {
        base_url: default_base_url(),
        api_token: None,
        request_timeout_secs: default_request_timeout_secs(),
    }
}

pub(crate) fn default_base_url() -> String {
    "http://localhost:8000/api".to_string()
}

pub(crate) fn default_request_timeout_secs() -> u64 {
    300
}

pub(crate) fn default_uploads() -> UploadsConfig {
    UploadsConfig {
        concurrency_limit: default_concurrency_limit(),
        max_file_size_bytes: default_max_file_size_bytes(),
        default_parse_mode: ParseMode::default(),
    }
}

pub(crate) fn default_concurrency_limit() -> usize {
    DEFAULT_CONCURRENCY_LIMIT
}

pub(crate) fn default_max_file_size_bytes() -> u64 {
    50 * 1024 * 1024
}

pub(crate) fn default_locale() -> String {
    "en".to_string()
}
